//! Owner alerts for deliveries that exhausted their attempts.
//!
//! Notifiers are called once per exhausted delivery and are never retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::record::{DeliveryFailure, DeliveryRecord};
use crate::webhook::Webhook;

/// Alert raised when a delivery is terminally failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryAlert {
    pub owner_id: String,
    pub webhook_id: String,
    pub webhook_name: String,
    pub delivery_id: String,
    pub event_type: String,
    pub attempts: u32,
    pub status_code: Option<u16>,
    pub reason: Option<DeliveryFailure>,
    pub failed_at: DateTime<Utc>,
}

impl DeliveryAlert {
    /// Builds the alert for an exhausted delivery.
    pub fn new(webhook: &Webhook, record: &DeliveryRecord) -> Self {
        Self {
            owner_id: webhook.owner_id.clone(),
            webhook_id: webhook.id.clone(),
            webhook_name: webhook.name.clone(),
            delivery_id: record.delivery_id.clone(),
            event_type: record.event_type.clone(),
            attempts: record.attempts,
            status_code: record.status_code,
            reason: record.last_failure.clone(),
            failed_at: record.last_attempt_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Receives alerts for exhausted deliveries.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    /// Called once per exhausted delivery. Must not retry.
    async fn delivery_exhausted(&self, alert: &DeliveryAlert);
}

/// Logs alerts through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl FailureNotifier for TracingNotifier {
    async fn delivery_exhausted(&self, alert: &DeliveryAlert) {
        tracing::warn!(
            owner_id = %alert.owner_id,
            webhook_id = %alert.webhook_id,
            delivery_id = %alert.delivery_id,
            event_type = %alert.event_type,
            attempts = alert.attempts,
            status_code = ?alert.status_code,
            "Webhook delivery exhausted all attempts"
        );
    }
}

/// Pushes alerts into a bounded channel for an owner-facing consumer.
///
/// A full or closed channel drops the alert.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<DeliveryAlert>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeliveryAlert>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl FailureNotifier for ChannelNotifier {
    async fn delivery_exhausted(&self, alert: &DeliveryAlert) {
        if let Err(e) = self.sender.try_send(alert.clone()) {
            tracing::warn!(
                delivery_id = %alert.delivery_id,
                error = %e,
                "Dropping delivery alert"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketplace_events::Event;
    use std::collections::BTreeSet;

    fn exhausted() -> (Webhook, DeliveryRecord) {
        let webhook = Webhook::new(
            "acct_1",
            "billing alerts",
            "https://example.com/hook",
            BTreeSet::from(["credits.low".to_string()]),
        );
        let event = Event::simple("acct_1", "credits.low", serde_json::json!({}));
        let mut record = DeliveryRecord::for_event(&webhook.id, &event, 1).unwrap();
        record.record_failure(&DeliveryFailure::HttpStatus { status: 502, body: None });
        (webhook, record)
    }

    #[test]
    fn test_alert_contents() {
        let (webhook, record) = exhausted();
        let alert = DeliveryAlert::new(&webhook, &record);

        assert_eq!(alert.owner_id, "acct_1");
        assert_eq!(alert.webhook_name, "billing alerts");
        assert_eq!(alert.delivery_id, record.delivery_id);
        assert_eq!(alert.status_code, Some(502));
        assert_eq!(alert.attempts, 1);
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_once() {
        let (webhook, record) = exhausted();
        let (notifier, mut receiver) = ChannelNotifier::new(4);

        notifier.delivery_exhausted(&DeliveryAlert::new(&webhook, &record)).await;

        let alert = receiver.recv().await.unwrap();
        assert_eq!(alert.delivery_id, record.delivery_id);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_channel_drops_alert() {
        let (webhook, record) = exhausted();
        let (notifier, mut receiver) = ChannelNotifier::new(1);
        let alert = DeliveryAlert::new(&webhook, &record);

        notifier.delivery_exhausted(&alert).await;
        notifier.delivery_exhausted(&alert).await;

        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }
}
