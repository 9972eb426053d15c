//! Error taxonomy for the synapse engine
//!
//! Everything below the CLI is lenient: transient I/O, corrupt state and
//! missing external capabilities are logged and absorbed. The typed errors
//! here exist for the few places that need a stable, machine-readable
//! condition: lock contention, corrupt persisted state, an unavailable
//! embedder, and invalid CLI input (the only strict surface).

use std::fmt;
use std::path::PathBuf;

/// Engine error conditions with stable codes
#[derive(Debug)]
pub enum EngineError {
    /// The sentinel lock could not be acquired within the retry budget.
    /// The mutation is dropped; the previously persisted state stands.
    LockContended { path: PathBuf, attempts: u32 },

    /// A persisted JSON file failed to parse. Treated as empty on load;
    /// the next successful write repairs it.
    CorruptState { file: PathBuf, reason: String },

    /// No embedding credential is configured. Not a failure: the recall
    /// pipeline proceeds local-only, but callers may want to report it.
    EmbedderUnavailable,

    /// Malformed user input on the CLI surface. The only error class that
    /// produces a non-zero exit.
    InvalidArgument { command: &'static str, reason: String },
}

impl EngineError {
    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockContended { .. } => "LOCK_CONTENDED",
            Self::CorruptState { .. } => "CORRUPT_STATE",
            Self::EmbedderUnavailable => "EMBEDDER_UNAVAILABLE",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockContended { path, attempts } => {
                write!(f, "lock {} still held after {attempts} attempts", path.display())
            }
            Self::CorruptState { file, reason } => {
                write!(f, "corrupt state in {}: {reason}", file.display())
            }
            Self::EmbedderUnavailable => {
                write!(f, "no embedding credential configured; vector search disabled")
            }
            Self::InvalidArgument { command, reason } => {
                write!(f, "{command}: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::EmbedderUnavailable.code(), "EMBEDDER_UNAVAILABLE");
        assert_eq!(
            EngineError::InvalidArgument {
                command: "pin-exp",
                reason: "missing colon".into()
            }
            .code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::LockContended {
            path: PathBuf::from("/tmp/.observer.lock"),
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains(".observer.lock"));
        assert!(msg.contains('5'));
    }
}
