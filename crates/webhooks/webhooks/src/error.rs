//! Webhook error types.

use thiserror::Error;

use marketplace_events::EventError;

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Error type for registry, dispatch and storage operations.
///
/// Delivery problems never surface here: they are retried by the executor and
/// recorded in the delivery log (see [`crate::DeliveryFailure`]).
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Endpoint URL is not an absolute https URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Event type is not in the catalog (or may not be subscribed to).
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// A webhook must subscribe to at least one event type.
    #[error("Webhook must subscribe to at least one event type")]
    EmptyEventSet,

    /// Webhook does not exist.
    #[error("Webhook not found: {0}")]
    NotFound(String),

    /// Webhook belongs to another owner.
    #[error("Not authorized to access webhook: {0}")]
    Unauthorized(String),

    /// Delivery record is terminal and can no longer be modified.
    #[error("Delivery record is finalized: {0}")]
    RecordFinalized(String),

    /// Delivery still has attempts left and cannot be redelivered yet.
    #[error("Delivery still in progress: {0}")]
    DeliveryInProgress(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Invalid payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Returns true for errors caused by caller input or ownership.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidUrl(_)
                | WebhookError::UnknownEventType(_)
                | WebhookError::EmptyEventSet
                | WebhookError::NotFound(_)
                | WebhookError::Unauthorized(_)
        )
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::InvalidPayload(err.to_string())
    }
}

impl From<EventError> for WebhookError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::UnknownEventType(t) => WebhookError::UnknownEventType(t),
        }
    }
}

impl From<url::ParseError> for WebhookError {
    fn from(err: url::ParseError) -> Self {
        WebhookError::InvalidUrl(err.to_string())
    }
}
