//! The two operations applications use: run git, and classify what it said.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

use tokio::process::Child;

use crate::environment::EnvironmentResolver;
use crate::error::Result;
use crate::errors::{self, GitError};
use crate::process::{self, ExecOptions, ExecResult};

/// Entry point for running the embedded git.
///
/// Each call resolves the environment afresh from the current process and
/// starts exactly one git process; calls share no state and may run
/// concurrently.
pub struct GitProcess;

impl GitProcess {
    /// Execute a command and read its output using the embedded git.
    ///
    /// Fails only when git cannot be launched or its output exceeds
    /// `options.max_buffer`. Inspect the result's `exit_code` and `stderr`
    /// (via [`GitProcess::parse_error`]) for git's own failures.
    pub async fn exec<I, S>(
        args: I,
        path: impl AsRef<Path>,
        options: ExecOptions,
    ) -> Result<ExecResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let resolver = EnvironmentResolver::from_process()?;
        process::exec_with(&resolver, args, path, options).await
    }

    /// Execute a command and interact with the process streams directly.
    pub fn spawn<I, S>(
        args: I,
        path: impl AsRef<Path>,
        env: &HashMap<String, String>,
    ) -> Result<Child>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let resolver = EnvironmentResolver::from_process()?;
        process::spawn_with(&resolver, args, path, env)
    }

    /// Try to parse an error type from stderr.
    pub fn parse_error(stderr: &str) -> Option<GitError> {
        errors::parse_error(stderr)
    }
}
