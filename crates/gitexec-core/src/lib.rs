//! gitexec core library
//!
//! Runs a bundled git executable as a subprocess and turns its failures into
//! something an application can act on:
//!
//! - [`environment`] — where git lives and the environment it runs with
//! - [`process`]     — one subprocess per call, bounded output capture
//! - [`errors`]      — ordered catalog mapping stderr text to [`GitError`]
//! - [`error`]       — launch failures ([`GitProcessError`]) and their codes
//! - [`git_process`] — the [`GitProcess`] facade
//!
//! ```ignore
//! let result = GitProcess::exec(["pull", "origin", "main"], repo, ExecOptions::default()).await?;
//! if !result.is_success() {
//!     if let Some(GitError::HTTPSAuthenticationFailed) = GitProcess::parse_error(&result.stderr) {
//!         // prompt for credentials
//!     }
//! }
//! ```

pub mod environment;
pub mod error;
pub mod errors;
pub mod git_process;
pub mod process;
pub mod telemetry;

pub use environment::{
    setup_environment, EnvironmentResolver, Platform, ResolvedEnvironment, GIT_EXEC_PATH,
    LOCAL_GIT_DIRECTORY,
};
pub use error::{
    EnvironmentError, GitProcessError, OutputStream, Result, GIT_NOT_FOUND_ERROR_CODE,
    OUTPUT_TOO_LARGE_ERROR_CODE, REPOSITORY_DOES_NOT_EXIST_ERROR_CODE,
};
pub use errors::{git_error_patterns, parse_error, GitError, GitErrorPattern};
pub use git_process::GitProcess;
pub use process::{
    exec_with, spawn_with, ExecOptions, ExecResult, ProcessCallback, Stdin, StdinEncoding,
    DEFAULT_MAX_BUFFER,
};
pub use telemetry::init_tracing;

/// gitexec version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
