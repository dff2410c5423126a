use std::fmt;
use std::path::PathBuf;

use inkterm_proc::ProcError;

/// Errors raised while a session runs a command cycle.
///
/// None of these tear a session down: the cycle that produced the error ends,
/// and the session goes back to reading commands after a prompt reset.
#[derive(Debug)]
pub enum ShellError {
    /// The document refused an insert, and the single retry against a
    /// re-resolved surface did not help.
    EditRejected { reason: String },
    /// An output producer delivered something other than bytes or text.
    UnexpectedOutputType { found: String },
    /// A builtin was invoked with the wrong number of arguments.
    MalformedCommand {
        command: String,
        expected: usize,
        received: usize,
    },
    /// The logical working directory could not be entered when spawning.
    UnresolvedWorkingDirectory {
        directory: PathBuf,
        source: ProcError,
    },
    /// Spawning failed for a reason unrelated to the working directory.
    Spawn(ProcError),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::EditRejected { reason } => write!(f, "document edit rejected: {reason}"),
            ShellError::UnexpectedOutputType { found } => {
                write!(f, "command produced unexpected output type: {found}")
            }
            ShellError::MalformedCommand {
                command,
                expected,
                received,
            } => write!(
                f,
                "{command}: expected {expected} argument(s), got {received}"
            ),
            ShellError::UnresolvedWorkingDirectory { directory, source } => write!(
                f,
                "working directory {} does not exist: {source}",
                directory.display()
            ),
            ShellError::Spawn(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::UnresolvedWorkingDirectory { source, .. } => Some(source),
            ShellError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProcError> for ShellError {
    fn from(err: ProcError) -> Self {
        ShellError::Spawn(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_command_message() {
        let err = ShellError::MalformedCommand {
            command: "cd".to_string(),
            expected: 1,
            received: 2,
        };
        assert_eq!(err.to_string(), "cd: expected 1 argument(s), got 2");
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let err: ShellError = ProcError::MissingPipe("stdin").into();
        assert!(matches!(err, ShellError::Spawn(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
