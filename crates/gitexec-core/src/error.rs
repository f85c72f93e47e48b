//! Launch-level failures: git could not be started or its output could not
//! be captured. A git process that ran and exited non-zero is not an error
//! here; see [`crate::ExecResult`] and [`crate::parse_error`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The error code for when git cannot be found. This most likely indicates a
/// problem with how the application bundles git.
pub const GIT_NOT_FOUND_ERROR_CODE: &str = "executable-not-found";

/// The error code for when the path to a repository doesn't exist.
pub const REPOSITORY_DOES_NOT_EXIST_ERROR_CODE: &str = "working-directory-not-found";

/// The error code for when git's output does not fit in the configured buffer.
pub const OUTPUT_TOO_LARGE_ERROR_CODE: &str = "output-too-large";

/// Which captured stream overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors raised while snapshotting the host environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("unable to locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("unable to resolve {variable} to an absolute path: {source}")]
    InvalidOverride {
        variable: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the invocation itself.
#[derive(Debug, thiserror::Error)]
pub enum GitProcessError {
    #[error(
        "Git could not be found at the expected path: '{}'. This might be a problem with how the application is packaged, so confirm this folder hasn't been removed when packaging.",
        path.display()
    )]
    GitNotFound { path: PathBuf },

    #[error("Unable to find path to repository on disk.")]
    RepositoryDoesNotExist { path: PathBuf },

    #[error(
        "The output from the command could not fit into the allocated {stream} buffer. Set max_buffer to a larger value than {max_buffer} bytes"
    )]
    OutputTooLarge {
        stream: OutputStream,
        max_buffer: usize,
    },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Any other OS-level launch or pipe error, passed through unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GitProcessError {
    /// Stable identifier for the classified launch failures.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GitProcessError::GitNotFound { .. } => Some(GIT_NOT_FOUND_ERROR_CODE),
            GitProcessError::RepositoryDoesNotExist { .. } => {
                Some(REPOSITORY_DOES_NOT_EXIST_ERROR_CODE)
            }
            GitProcessError::OutputTooLarge { .. } => Some(OUTPUT_TOO_LARGE_ERROR_CODE),
            GitProcessError::Environment(_) | GitProcessError::Io(_) => None,
        }
    }
}

/// Result type for git process operations.
pub type Result<T> = std::result::Result<T, GitProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_does_not_exist_message() {
        let err = GitProcessError::RepositoryDoesNotExist {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(err.to_string(), "Unable to find path to repository on disk.");
        assert_eq!(err.code(), Some(REPOSITORY_DOES_NOT_EXIST_ERROR_CODE));
    }

    #[test]
    fn test_git_not_found_names_path() {
        let err = GitProcessError::GitNotFound {
            path: PathBuf::from("/opt/app/git/bin/git"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'/opt/app/git/bin/git'"));
        assert!(msg.contains("packaging"));
        assert_eq!(err.code(), Some(GIT_NOT_FOUND_ERROR_CODE));
    }

    #[test]
    fn test_output_too_large_names_bound() {
        let err = GitProcessError::OutputTooLarge {
            stream: OutputStream::Stderr,
            max_buffer: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("stderr buffer"));
        assert!(msg.contains("1024 bytes"));
        assert_eq!(err.code(), Some(OUTPUT_TOO_LARGE_ERROR_CODE));
    }

    #[test]
    fn test_io_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = GitProcessError::from(io);
        assert_eq!(err.to_string(), "denied");
        assert_eq!(err.code(), None);
    }
}
