//! Error taxonomy shared by every crate
//!
//! Each crate keeps its own `thiserror` enum and converts into [`Error`].
//! Every variant is fatal: nothing in the workspace retries or recovers.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error
#[derive(Error, Debug)]
pub enum Error {
    /// Prompt file or document directory missing/unreadable, or a
    /// destination directory that cannot be created
    #[error("File access error at {path}: {message}")]
    FileAccess { path: PathBuf, message: String },

    /// Persisted state (the vector index) is unreadable or incompatible
    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    /// Transport-level connect failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failure inside an external capability during a live session
    #[error("Runtime adapter error ({component}): {message}")]
    RuntimeAdapter { component: String, message: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a runtime adapter failure
    pub fn adapter(component: impl Into<String>, message: impl ToString) -> Self {
        Error::RuntimeAdapter {
            component: component.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure happened before the session started
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Error::FileAccess { .. } | Error::CorruptState(_) | Error::Config(_)
        )
    }
}

/// Result alias using the core error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_shorthand() {
        let err = Error::adapter("stt", "timeout");
        assert_eq!(err.to_string(), "Runtime adapter error (stt): timeout");
        assert!(!err.is_startup());
    }

    #[test]
    fn test_startup_classification() {
        let err = Error::FileAccess {
            path: PathBuf::from("prompt.txt"),
            message: "not found".to_string(),
        };
        assert!(err.is_startup());
        assert!(Error::CorruptState("bad".into()).is_startup());
        assert!(!Error::Connection("refused".into()).is_startup());
    }
}
