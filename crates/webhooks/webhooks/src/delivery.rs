//! Delivery executor: signs, sends and retries one logical delivery.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::error::WebhookError;
use crate::log::DeliveryLog;
use crate::notifier::{DeliveryAlert, FailureNotifier};
use crate::record::{DeliveryFailure, DeliveryRecord, truncate_body};
use crate::retry::RetryStrategy;
use crate::signature::{WebhookSigner, headers};
use crate::storage::WebhookStore;
use crate::transport::{OutboundRequest, TransportResponse, WebhookTransport};
use crate::webhook::Webhook;

/// Runs deliveries to completion.
///
/// Every attempt reloads the webhook, so a rotated secret or changed URL is
/// picked up by the next attempt and a deleted webhook stops its deliveries.
/// Failures are recorded in the delivery log and never returned to callers.
pub struct DeliveryExecutor {
    webhooks: Arc<dyn WebhookStore>,
    log: Arc<dyn DeliveryLog>,
    transport: Arc<dyn WebhookTransport>,
    retry: Arc<dyn RetryStrategy>,
    notifier: Arc<dyn FailureNotifier>,
    request_timeout: Duration,
    response_body_limit: usize,
    user_agent: String,
}

impl DeliveryExecutor {
    /// Creates a new executor.
    pub fn new(
        webhooks: Arc<dyn WebhookStore>,
        log: Arc<dyn DeliveryLog>,
        transport: Arc<dyn WebhookTransport>,
        retry: Arc<dyn RetryStrategy>,
        notifier: Arc<dyn FailureNotifier>,
        config: &WebhookConfig,
    ) -> Self {
        Self {
            webhooks,
            log,
            transport,
            retry,
            notifier,
            request_timeout: config.request_timeout_duration(),
            response_body_limit: config.response_body_limit,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Attempt budget given to new deliveries.
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts()
    }

    /// Drives `record` until it succeeds, exhausts its attempts, or its
    /// webhook disappears. Returns the last state of the record.
    ///
    /// A store error while reloading the webhook counts as a failed attempt.
    pub async fn run(&self, mut record: DeliveryRecord) -> DeliveryRecord {
        let mut webhook: Option<Webhook> = None;

        while !record.is_terminal() {
            let result = match self.webhooks.get(&record.webhook_id).await {
                Ok(Some(current)) => {
                    let result = self.attempt(&current, &record).await;
                    webhook = Some(current);
                    result
                }
                Ok(None) => {
                    tracing::debug!(
                        delivery_id = %record.delivery_id,
                        webhook_id = %record.webhook_id,
                        "Webhook removed, abandoning delivery"
                    );
                    return record;
                }
                Err(e) => {
                    tracing::warn!(
                        delivery_id = %record.delivery_id,
                        webhook_id = %record.webhook_id,
                        error = %e,
                        "Failed to load webhook for delivery"
                    );
                    Err(DeliveryFailure::Request {
                        message: format!("failed to load webhook: {e}"),
                    })
                }
            };

            match result {
                Ok(response) => {
                    let body = self.captured_body(&response.body);
                    record.record_success(response.status, body);
                }
                Err(failure) => {
                    tracing::debug!(
                        delivery_id = %record.delivery_id,
                        attempt = record.attempts + 1,
                        error = %failure,
                        "Webhook delivery attempt failed"
                    );
                    record.record_failure(&failure);
                }
            }

            match self.log.update(&record).await {
                Ok(()) => {}
                Err(WebhookError::NotFound(_)) => {
                    // Log rows are removed together with their webhook
                    tracing::debug!(
                        delivery_id = %record.delivery_id,
                        "Delivery record removed, abandoning delivery"
                    );
                    return record;
                }
                Err(e) => {
                    tracing::error!(
                        delivery_id = %record.delivery_id,
                        error = %e,
                        "Failed to persist delivery attempt"
                    );
                }
            }

            if record.success {
                tracing::info!(
                    delivery_id = %record.delivery_id,
                    webhook_id = %record.webhook_id,
                    event_type = %record.event_type,
                    attempts = record.attempts,
                    status_code = ?record.status_code,
                    "Webhook delivered"
                );
                return record;
            }

            if record.is_terminal() {
                tracing::warn!(
                    delivery_id = %record.delivery_id,
                    webhook_id = %record.webhook_id,
                    attempts = record.attempts,
                    "Webhook delivery failed permanently"
                );
                match &webhook {
                    Some(webhook) => {
                        self.notifier
                            .delivery_exhausted(&DeliveryAlert::new(webhook, &record))
                            .await;
                    }
                    None => {
                        tracing::error!(
                            delivery_id = %record.delivery_id,
                            webhook_id = %record.webhook_id,
                            "Webhook never loaded, no failure alert sent"
                        );
                    }
                }
                return record;
            }

            let delay = self.retry.next_delay(record.attempts).unwrap_or_default();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        record
    }

    /// Makes one signed POST of the record's payload.
    async fn attempt(
        &self,
        webhook: &Webhook,
        record: &DeliveryRecord,
    ) -> Result<TransportResponse, DeliveryFailure> {
        let timestamp = Utc::now().timestamp();
        let signature = WebhookSigner::new(webhook.secret.expose())
            .sign_header(timestamp, record.payload.as_bytes());

        let request = OutboundRequest {
            url: webhook.url.clone(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("User-Agent".to_string(), self.user_agent.clone()),
                (headers::SIGNATURE.to_string(), signature),
                (headers::TIMESTAMP.to_string(), timestamp.to_string()),
                (headers::EVENT.to_string(), record.event_type.clone()),
                (headers::ID.to_string(), record.delivery_id.clone()),
            ],
            body: record.payload.clone(),
            timeout: self.request_timeout,
        };

        let response = match tokio::time::timeout(self.request_timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(DeliveryFailure::Timeout),
        };

        if (200..300).contains(&response.status) {
            Ok(response)
        } else {
            Err(DeliveryFailure::HttpStatus {
                status: response.status,
                body: self.captured_body(&response.body),
            })
        }
    }

    fn captured_body(&self, body: &str) -> Option<String> {
        if body.is_empty() {
            None
        } else {
            Some(truncate_body(body, self.response_body_limit))
        }
    }
}
