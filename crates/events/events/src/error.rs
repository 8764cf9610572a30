//! Event error types.

use thiserror::Error;

/// Result type for event operations.
pub type EventResult<T> = Result<T, EventError>;

/// Error type for event catalog operations.
#[derive(Debug, Error)]
pub enum EventError {
    /// Event type not registered.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}
