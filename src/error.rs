//! Error handling module for scenegraft
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Only build-level failures travel through these types; entry-level defects
//! (unnamed entries, unknown types, unresolved members) are reported as
//! [`Diagnostic`](crate::builder::Diagnostic) values and never abort a build.

use thiserror::Error;

use crate::host::HostError;

/// Main error type for scenegraft
#[derive(Error, Debug)]
pub enum SceneGraftError {
    /// IO errors (reading descriptions, listing directories)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The outer serialized document is unusable
    #[error("Document error: {0}")]
    Document(String),

    /// The host reported a failure it cannot recover from
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Configuration values that fail validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Installation workflow errors
    #[error("Install error: {0}")]
    Install(String),

    /// Install state machine transition errors
    #[error("Install transition error: {0}")]
    InstallTransition(String),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for scenegraft operations
pub type Result<T> = std::result::Result<T, SceneGraftError>;

impl SceneGraftError {
    /// Create a document error
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an installation error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SceneGraftError::document("sources is not an array");
        assert_eq!(err.to_string(), "Document error: sources is not an array");

        let err = SceneGraftError::install("data.json missing");
        assert_eq!(err.to_string(), "Install error: data.json missing");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SceneGraftError = io_err.into();
        assert!(matches!(err, SceneGraftError::Io(_)));
    }

    #[test]
    fn test_host_error_conversion() {
        let err: SceneGraftError = HostError::unavailable("graphics context lost").into();
        assert!(matches!(err, SceneGraftError::Host(_)));
        assert!(err.to_string().contains("graphics context lost"));
    }
}
