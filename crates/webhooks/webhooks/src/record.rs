//! Delivery records and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use marketplace_events::Event;

use crate::error::WebhookResult;

/// Body sent to webhook endpoints.
///
/// Serialized once when the delivery is created; field order is fixed.
#[derive(Debug, Serialize)]
struct DeliveryEnvelope<'a> {
    id: &'a str,
    event: &'a str,
    created_at: DateTime<Utc>,
    data: &'a Value,
}

/// One logical delivery of an event to one webhook, across all attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Idempotency key sent as `X-Webhook-Id`; stable across retries.
    pub delivery_id: String,
    /// Owning webhook.
    pub webhook_id: String,
    /// Simple event type string.
    pub event_type: String,
    /// Exact JSON body transmitted on every attempt.
    pub payload: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// Attempt budget captured when the delivery was created.
    pub max_attempts: u32,
    /// HTTP status of the most recent response, if any.
    pub status_code: Option<u16>,
    /// Response body of the most recent response (truncated).
    pub response: Option<String>,
    /// Failure of the most recent attempt, cleared on success.
    pub last_failure: Option<DeliveryFailure>,
    /// Whether the most recent attempt succeeded.
    pub success: bool,
    /// When the delivery was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent attempt finished.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Creates a pending delivery of `event` to `webhook_id`.
    pub fn for_event(webhook_id: impl Into<String>, event: &Event, max_attempts: u32) -> WebhookResult<Self> {
        let delivery_id = new_delivery_id();
        let event_type = event.simple_type_string();
        let created_at = Utc::now();

        let payload = serde_json::to_string(&DeliveryEnvelope {
            id: &delivery_id,
            event: &event_type,
            created_at,
            data: &event.payload,
        })?;

        Ok(Self {
            delivery_id,
            webhook_id: webhook_id.into(),
            event_type,
            payload,
            attempts: 0,
            max_attempts,
            status_code: None,
            response: None,
            last_failure: None,
            success: false,
            created_at,
            last_attempt_at: None,
        })
    }

    /// Creates a new logical delivery that resends this record's body.
    pub fn redelivery(&self, max_attempts: u32) -> Self {
        Self {
            delivery_id: new_delivery_id(),
            webhook_id: self.webhook_id.clone(),
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            attempts: 0,
            max_attempts,
            status_code: None,
            response: None,
            last_failure: None,
            success: false,
            created_at: Utc::now(),
            last_attempt_at: None,
        }
    }

    /// Checks whether the record can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.success || self.attempts >= self.max_attempts
    }

    /// Records a successful attempt.
    pub fn record_success(&mut self, status_code: u16, response: Option<String>) {
        self.attempts += 1;
        self.status_code = Some(status_code);
        self.response = response;
        self.last_failure = None;
        self.success = true;
        self.last_attempt_at = Some(Utc::now());
    }

    /// Records a failed attempt.
    ///
    /// Transport failures keep the last observed status and response.
    pub fn record_failure(&mut self, failure: &DeliveryFailure) {
        self.attempts += 1;
        if let DeliveryFailure::HttpStatus { status, body } = failure {
            self.status_code = Some(*status);
            self.response = body.clone();
        }
        self.last_failure = Some(failure.clone());
        self.success = false;
        self.last_attempt_at = Some(Utc::now());
    }

    /// Returns the final outcome, or `None` while attempts remain.
    pub fn outcome(&self) -> Option<DeliveryOutcome> {
        if self.success {
            return Some(DeliveryOutcome::Delivered {
                status_code: self.status_code.unwrap_or_default(),
                attempts: self.attempts,
            });
        }
        if !self.is_terminal() {
            return None;
        }

        let reason = self
            .last_failure
            .clone()
            .unwrap_or_else(|| DeliveryFailure::Request {
                message: "no attempt recorded".to_string(),
            });
        Some(DeliveryOutcome::Failed {
            reason,
            attempts: self.attempts,
        })
    }

    /// Returns the listing view of this record.
    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            delivery_id: self.delivery_id.clone(),
            event_type: self.event_type.clone(),
            status_code: self.status_code,
            attempts: self.attempts,
            success: self.success,
            created_at: self.created_at,
        }
    }
}

/// Listing row of the delivery log read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySummary {
    /// Logical delivery id, stable across retries.
    pub delivery_id: String,
    /// Event type that was delivered.
    pub event_type: String,
    /// Status of the last response, if the endpoint answered.
    pub status_code: Option<u16>,
    /// Attempts made so far.
    pub attempts: u32,
    /// Whether the delivery succeeded.
    pub success: bool,
    /// When the delivery was created.
    pub created_at: DateTime<Utc>,
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// No response within the per-attempt timeout.
    #[error("Request timeout")]
    Timeout,

    /// Connection could not be established.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// Endpoint answered outside 200..=299.
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: Option<String> },

    /// Any other request error.
    #[error("Request failed: {message}")]
    Request { message: String },
}

/// Final result of a logical delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint acknowledged with a 2xx status.
    Delivered { status_code: u16, attempts: u32 },
    /// Attempt budget exhausted.
    Failed { reason: DeliveryFailure, attempts: u32 },
}

impl DeliveryOutcome {
    /// Checks whether the delivery succeeded.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Truncates `body` to at most `limit` bytes on a character boundary.
pub(crate) fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn new_delivery_id() -> String {
    format!("dlv_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(max_attempts: u32) -> DeliveryRecord {
        let event = Event::simple("acct_1", "credits.low", serde_json::json!({"balance": 42}));
        DeliveryRecord::for_event("wh_1", &event, max_attempts).unwrap()
    }

    #[test]
    fn test_envelope_layout() {
        let record = record(3);
        let body: Value = serde_json::from_str(&record.payload).unwrap();

        assert_eq!(body["id"], record.delivery_id.as_str());
        assert_eq!(body["event"], "credits.low");
        assert_eq!(body["data"]["balance"], 42);
        assert!(record.payload.starts_with("{\"id\":"));
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = record(3);
        assert_eq!(record.attempts, 0);
        assert!(!record.success);
        assert!(record.status_code.is_none());
        assert!(!record.is_terminal());
        assert!(record.outcome().is_none());
    }

    #[test]
    fn test_success_is_terminal() {
        let mut record = record(3);
        record.record_failure(&DeliveryFailure::Timeout);
        record.record_success(204, None);

        assert!(record.is_terminal());
        assert_eq!(record.attempts, 2);
        assert!(record.last_failure.is_none());
        assert_eq!(
            record.outcome(),
            Some(DeliveryOutcome::Delivered { status_code: 204, attempts: 2 })
        );
    }

    #[test]
    fn test_exhaustion_keeps_last_observed_status() {
        let mut record = record(2);
        record.record_failure(&DeliveryFailure::HttpStatus {
            status: 503,
            body: Some("busy".into()),
        });
        record.record_failure(&DeliveryFailure::Timeout);

        assert!(record.is_terminal());
        assert_eq!(record.status_code, Some(503));
        assert_eq!(record.response.as_deref(), Some("busy"));
        assert_eq!(record.last_failure, Some(DeliveryFailure::Timeout));
        assert!(matches!(
            record.outcome(),
            Some(DeliveryOutcome::Failed { attempts: 2, .. })
        ));
    }

    #[test]
    fn test_http_failure_outcome() {
        let mut record = record(1);
        record.record_failure(&DeliveryFailure::HttpStatus { status: 500, body: None });

        assert_eq!(
            record.outcome(),
            Some(DeliveryOutcome::Failed {
                reason: DeliveryFailure::HttpStatus { status: 500, body: None },
                attempts: 1,
            })
        );
    }

    #[test]
    fn test_redelivery_gets_new_id_and_same_body() {
        let mut original = record(2);
        original.record_failure(&DeliveryFailure::Timeout);
        original.record_failure(&DeliveryFailure::Timeout);

        let replay = original.redelivery(4);
        assert_ne!(replay.delivery_id, original.delivery_id);
        assert_eq!(replay.payload, original.payload);
        assert_eq!(replay.attempts, 0);
        assert_eq!(replay.max_attempts, 4);
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short", 10), "short");
        assert_eq!(truncate_body("abcdef", 3), "abc");
        // 'é' is two bytes; never split it
        assert_eq!(truncate_body("aé", 2), "a");
    }
}
