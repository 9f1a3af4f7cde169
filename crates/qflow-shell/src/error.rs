//! Error types for the shell crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving an interpreter session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShellError {
    /// `execute()` was called before `start()`.
    #[error("Interpreter process has not been started - call start() before executing commands")]
    ProcessNotStarted,

    /// The configured interpreter path does not resolve to a file.
    #[error("Cannot resolve path for interpreter executable: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    /// The interpreter could not be spawned.
    #[error("Failed to spawn interpreter {}: {source}", program.display())]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The launched process did not expose one of its standard streams.
    #[error("Interpreter process has no {0} pipe")]
    MissingPipe(&'static str),

    /// The interpreter wrote to its error channel while running a command.
    ///
    /// Non-fatal: the session stays usable.
    #[error("Interpreter error: {0}")]
    Interpreter(String),

    /// No boundary marker arrived within the configured timeout.
    ///
    /// The session is stopped before this error is returned.
    #[error("Interpreter did not finish the command within {0:?}")]
    ProcessHung(Duration),

    /// An output channel closed before its boundary marker arrived.
    #[error("Interpreter process exited while a command was running")]
    ProcessExited,

    /// A previous `execute()` was dropped while its command was being
    /// written, so the interpreter input is in an unknown state.
    ///
    /// The session is stopped before this error is returned.
    #[error("A cancelled command left the interpreter input half-written")]
    Interrupted,

    /// IO error on one of the process pipes.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Whether the error leaves the session running.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ShellError::Interpreter(_))
    }
}

/// Result type for shell operations.
pub type ShellResult<T> = Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShellError::ExecutableNotFound(PathBuf::from("/opt/venv/bin/python"));
        assert_eq!(
            err.to_string(),
            "Cannot resolve path for interpreter executable: /opt/venv/bin/python"
        );

        let err = ShellError::Interpreter("NameError: name 'y' is not defined".into());
        assert_eq!(
            err.to_string(),
            "Interpreter error: NameError: name 'y' is not defined"
        );
    }

    #[test]
    fn test_only_interpreter_errors_are_recoverable() {
        assert!(ShellError::Interpreter("boom".into()).is_recoverable());
        assert!(!ShellError::ProcessNotStarted.is_recoverable());
        assert!(!ShellError::ProcessExited.is_recoverable());
        assert!(!ShellError::ProcessHung(Duration::from_secs(1)).is_recoverable());
        assert!(!ShellError::Interrupted.is_recoverable());
    }
}
