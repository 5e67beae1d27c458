//! Error types for the karas trainer.
//!
//! Configuration errors fail fast at the call site. Failures raised inside
//! the training loop are handled by the trainer according to its
//! [`FailurePolicy`](crate::trainer::FailurePolicy).

use thiserror::Error;

/// Top-level error type for trainer operations.
#[derive(Debug, Error)]
pub enum KarasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Update step failed: {0}")]
    Step(String),

    #[error("Extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    #[error("Training has not been started yet")]
    NotStarted,

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl KarasError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn step(msg: impl Into<String>) -> Self {
        Self::Step(msg.into())
    }

    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Wrap a failure raised by the extension registered as `name`.
    pub fn extension(name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Extension {
            name: name.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error belongs to the fail-fast configuration class.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NotFound(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KarasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_error_message() {
        let err = KarasError::extension("LogReport", "disk full");
        assert_eq!(err.to_string(), "Extension 'LogReport' failed: disk full");
        assert!(!err.is_config());
    }

    #[test]
    fn test_config_class() {
        assert!(KarasError::config("bad period").is_config());
        assert!(KarasError::not_found("extension foo").is_config());
        assert!(!KarasError::step("nan loss").is_config());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: KarasError = io.into();
        assert!(matches!(err, KarasError::Io(_)));
    }
}
