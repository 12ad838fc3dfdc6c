//! Result and error types for Medir.

use thiserror::Error;

/// Result type for Medir operations
pub type MedirResult<T> = Result<T, MedirError>;

/// Errors that can occur in Medir
///
/// Lifecycle operations on [`crate::PageTest`] absorb collaborator failures
/// (missing windows, failed captures, failed stat reads) rather than
/// propagating them; this type exists for collaborator implementations and
/// configuration validation.
#[derive(Debug, Error)]
pub enum MedirError {
    /// Browser window handles could not be resolved
    #[error("Browser window not found for process {pid}")]
    WindowNotFound {
        /// Process id that was searched
        pid: u32,
    },

    /// Capture provider could not produce an image
    #[error("Capture failed for window {window}: {message}")]
    CaptureFailed {
        /// Window handle that was captured
        window: u64,
        /// Error message
        message: String,
    },

    /// Process stats query failed
    #[error("Process stats unavailable: {message}")]
    StatsUnavailable {
        /// Error message
        message: String,
    },

    /// Invalid test configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_not_found_display() {
        let err = MedirError::WindowNotFound { pid: 4242 };
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_capture_failed_display() {
        let err = MedirError::CaptureFailed {
            window: 7,
            message: "surface lost".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("surface lost"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MedirError = io.into();
        assert!(matches!(err, MedirError::Io(_)));
    }
}
