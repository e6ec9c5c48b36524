//! Event-stream error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, SseError>;

/// Errors that can occur while decoding an event stream.
#[derive(Error, Debug)]
pub enum SseError {
    /// A single line grew past the configured limit without a terminator.
    #[error("Line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    /// IO errors from the underlying transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
