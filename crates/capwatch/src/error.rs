//! Error types for capwatch.
//!
//! Transient OS-access failures never reach this enum: they degrade to
//! sentinel values or skipped observations inside the probe, scanner and
//! watcher. What remains here is what a caller can actually act on.

use thiserror::Error;

use crate::probe::ProbeError;

/// The main error type for capwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Observation Errors ===
    /// The platform probe cannot observe anything; surfaced at engine
    /// start so a blind monitor never reports false confidence.
    #[error("observation failed: {0}")]
    Probe(#[from] ProbeError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for capwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from the platform probe.
    #[must_use]
    pub fn is_probe_error(&self) -> bool {
        matches!(self, Self::Probe(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");

        let err = Error::ConfigValidation {
            message: "tick_interval_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn test_is_probe_error() {
        let err: Error = ProbeError::Unavailable("clipboard".into()).into();
        assert!(err.is_probe_error());
        assert!(!Error::internal("x").is_probe_error());
    }

    #[test]
    fn test_probe_error_context_preserved() {
        let err: Error = ProbeError::Unavailable("win32 window enumeration".into()).into();
        assert!(err.to_string().contains("win32 window enumeration"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }
}
