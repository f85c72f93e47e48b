//! Git process execution: one subprocess per call, output collected once the
//! process exits.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::environment::{EnvironmentResolver, ResolvedEnvironment};
use crate::error::{GitProcessError, OutputStream, Result};
use crate::errors::{parse_error, GitError};

/// Default bound for each captured stream (10 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 10 * 1024 * 1024;

/// Encoding applied to [`Stdin::Text`] before it is written to git.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdinEncoding {
    #[default]
    Utf8,
    /// One byte per char; chars above U+00FF keep only their low byte.
    Latin1,
    Utf16Le,
}

/// Input delivered to git's standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stdin {
    Text(String),
    Bytes(Vec<u8>),
}

impl Stdin {
    fn encode(self, encoding: StdinEncoding) -> Vec<u8> {
        match self {
            Stdin::Bytes(bytes) => bytes,
            Stdin::Text(text) => match encoding {
                StdinEncoding::Utf8 => text.into_bytes(),
                StdinEncoding::Latin1 => {
                    text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect()
                }
                StdinEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            },
        }
    }
}

impl From<&str> for Stdin {
    fn from(text: &str) -> Self {
        Stdin::Text(text.to_string())
    }
}

impl From<String> for Stdin {
    fn from(text: String) -> Self {
        Stdin::Text(text)
    }
}

impl From<Vec<u8>> for Stdin {
    fn from(bytes: Vec<u8>) -> Self {
        Stdin::Bytes(bytes)
    }
}

/// Observer invoked with the live child once it has been spawned.
///
/// The standard streams have already been taken by the executor when the
/// callback runs, so it cannot interfere with the captured output; it can
/// read the pid, or kill the process to implement a timeout or cancellation.
/// Callers that need to drive stdin, stdout or stderr themselves should use
/// [`spawn_with`] (or [`crate::GitProcess::spawn`]) instead, which hands back
/// the child with all three streams still attached.
pub type ProcessCallback = Box<dyn FnOnce(&mut Child) + Send>;

/// Options for [`exec_with`].
pub struct ExecOptions {
    /// Input to write to git's stdin. When absent stdin is closed immediately.
    pub stdin: Option<Stdin>,
    pub stdin_encoding: StdinEncoding,
    /// Bound for each of stdout and stderr, in bytes.
    pub max_buffer: usize,
    /// Variables layered over the resolved environment; these win collisions.
    pub env: HashMap<String, String>,
    pub process_callback: Option<ProcessCallback>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            stdin: None,
            stdin_encoding: StdinEncoding::default(),
            max_buffer: DEFAULT_MAX_BUFFER,
            env: HashMap::new(),
            process_callback: None,
        }
    }
}

impl fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOptions")
            .field("stdin", &self.stdin)
            .field("stdin_encoding", &self.stdin_encoding)
            .field("max_buffer", &self.max_buffer)
            .field("env", &self.env)
            .field("process_callback", &self.process_callback.is_some())
            .finish()
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdin(mut self, stdin: impl Into<Stdin>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_stdin_encoding(mut self, encoding: StdinEncoding) -> Self {
        self.stdin_encoding = encoding;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_process_callback(
        mut self,
        callback: impl FnOnce(&mut Child) + Send + 'static,
    ) -> Self {
        self.process_callback = Some(Box::new(callback));
        self
    }
}

/// Outcome of a git process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ExecResult {
    /// Whether git exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Classify this result's stderr.
    pub fn parse_error(&self) -> Option<GitError> {
        parse_error(&self.stderr)
    }
}

fn git_command(resolved: &ResolvedEnvironment, args: &[OsString], cwd: &Path) -> Command {
    let mut command = Command::new(&resolved.git_location);
    command
        .args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(&resolved.env);
    command
}

/// Map a failed spawn to a launch failure.
///
/// `NotFound` is reported both for a missing program and for a missing
/// working directory; the directory check tells them apart.
fn classify_spawn_error(
    err: io::Error,
    git_location: &Path,
    cwd: &Path,
    cwd_exists: bool,
) -> GitProcessError {
    let err = if err.kind() != io::ErrorKind::NotFound {
        GitProcessError::Io(err)
    } else if !cwd_exists {
        GitProcessError::RepositoryDoesNotExist {
            path: cwd.to_path_buf(),
        }
    } else {
        GitProcessError::GitNotFound {
            path: git_location.to_path_buf(),
        }
    };
    warn!(code = ?err.code(), error = %err, "git failed to launch");
    err
}

async fn write_stdin(pipe: Option<ChildStdin>, input: Option<Vec<u8>>) -> Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    if let Err(err) = pipe.write_all(&input).await {
        if err.kind() != io::ErrorKind::BrokenPipe {
            return Err(err.into());
        }
        debug!("git closed stdin before consuming all input");
    }
    // Dropping the pipe closes git's stdin.
    drop(pipe);
    Ok(())
}

async fn read_bounded<R>(
    pipe: Option<R>,
    max_buffer: usize,
    stream: OutputStream,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(pipe) = pipe else {
        return Ok(buf);
    };
    let limit = u64::try_from(max_buffer).unwrap_or(u64::MAX).saturating_add(1);
    pipe.take(limit).read_to_end(&mut buf).await?;
    if buf.len() > max_buffer {
        return Err(GitProcessError::OutputTooLarge { stream, max_buffer });
    }
    Ok(buf)
}

/// Execute git and collect its output.
///
/// Resolves only after git exits. A non-zero exit code is a normal
/// [`ExecResult`]; the error path is reserved for launch failures and
/// output that exceeds `max_buffer` on either stream.
pub async fn exec_with<I, S>(
    resolver: &EnvironmentResolver,
    args: I,
    path: impl AsRef<Path>,
    options: ExecOptions,
) -> Result<ExecResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let cwd = path.as_ref();
    let ExecOptions {
        stdin,
        stdin_encoding,
        max_buffer,
        env,
        process_callback,
    } = options;

    let resolved = resolver.resolve(&env)?;
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    debug!(
        git = %resolved.git_location.display(),
        args = ?args,
        cwd = %cwd.display(),
        "spawning git"
    );

    let spawned = git_command(&resolved, &args, cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            let cwd_exists = tokio::fs::try_exists(cwd).await.unwrap_or(false);
            return Err(classify_spawn_error(err, &resolved.git_location, cwd, cwd_exists));
        }
    };

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    if let Some(callback) = process_callback {
        callback(&mut child);
    }

    let input = stdin.map(|s| s.encode(stdin_encoding));
    let captured = tokio::try_join!(
        write_stdin(stdin_pipe, input),
        read_bounded(stdout_pipe, max_buffer, OutputStream::Stdout),
        read_bounded(stderr_pipe, max_buffer, OutputStream::Stderr),
    );

    let (stdout, stderr) = match captured {
        Ok(((), stdout, stderr)) => (stdout, stderr),
        Err(err) => {
            if let Err(kill_err) = child.kill().await {
                debug!(error = %kill_err, "unable to kill git after capture failure");
            }
            warn!(code = ?err.code(), error = %err, "git output could not be captured");
            return Err(err);
        }
    };

    let status = child.wait().await?;
    debug!(
        exit_code = ?status.code(),
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "git exited"
    );

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code(),
    })
}

/// Spawn git and hand back the live child with all three streams piped.
///
/// Nothing is collected; launch failures are classified as in [`exec_with`].
/// Must be called from within a tokio runtime.
pub fn spawn_with<I, S>(
    resolver: &EnvironmentResolver,
    args: I,
    path: impl AsRef<Path>,
    env: &HashMap<String, String>,
) -> Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let cwd = path.as_ref();
    let resolved = resolver.resolve(env)?;
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    debug!(
        git = %resolved.git_location.display(),
        args = ?args,
        cwd = %cwd.display(),
        "spawning git"
    );

    git_command(&resolved, &args, cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| classify_spawn_error(err, &resolved.git_location, cwd, cwd.exists()))
}
