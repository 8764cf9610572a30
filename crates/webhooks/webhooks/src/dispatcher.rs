//! Event fan-out to subscribed webhooks.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use marketplace_events::{Event, TEST_EVENT};

use crate::delivery::DeliveryExecutor;
use crate::error::{WebhookError, WebhookResult};
use crate::log::DeliveryLog;
use crate::record::DeliveryRecord;
use crate::registry::SubscriptionRegistry;
use crate::webhook::Webhook;

/// Result of a publish: the event and the deliveries it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReceipt {
    /// Id of the published event.
    pub event_id: String,
    /// One delivery per matching webhook, in no particular order.
    pub delivery_ids: Vec<String>,
}

/// Turns events into deliveries and runs them in the background.
///
/// Each delivery gets its own task; deliveries never wait on each other.
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    log: Arc<dyn DeliveryLog>,
    executor: Arc<DeliveryExecutor>,
    tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(registry: SubscriptionRegistry, log: Arc<dyn DeliveryLog>, executor: Arc<DeliveryExecutor>) -> Self {
        Self {
            registry,
            log,
            executor,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Publishes an event on behalf of `owner_id`.
    ///
    /// Returns once the deliveries are recorded; their outcomes land in the
    /// delivery log.
    pub async fn publish(&self, owner_id: &str, event_type: &str, payload: Value) -> WebhookResult<PublishReceipt> {
        if !self.registry.catalog().is_registered(event_type) {
            return Err(WebhookError::UnknownEventType(event_type.to_string()));
        }
        self.dispatch(&Event::simple(owner_id, event_type, payload)).await
    }

    /// Fans `event` out to the owner's active webhooks subscribed to its type.
    pub async fn dispatch(&self, event: &Event) -> WebhookResult<PublishReceipt> {
        let event_type = event.simple_type_string();
        if !self.registry.catalog().is_registered(&event_type) {
            return Err(WebhookError::UnknownEventType(event_type));
        }

        let targets: Vec<Webhook> = self
            .registry
            .list(&event.owner_id)
            .await?
            .into_iter()
            .filter(|webhook| webhook.should_receive(&event_type))
            .collect();

        let mut delivery_ids = Vec::with_capacity(targets.len());
        for webhook in &targets {
            let record = DeliveryRecord::for_event(&webhook.id, event, self.executor.max_attempts())?;
            delivery_ids.push(record.delivery_id.clone());
            self.start(record).await?;
        }

        tracing::debug!(
            event_id = %event.id,
            event_type = %event_type,
            deliveries = delivery_ids.len(),
            "Event dispatched"
        );

        Ok(PublishReceipt {
            event_id: event.id.clone(),
            delivery_ids,
        })
    }

    /// Sends a sample test event to one webhook, regardless of its
    /// subscriptions or active flag.
    pub async fn test_webhook(&self, webhook_id: &str, owner_id: &str) -> WebhookResult<DeliveryRecord> {
        let webhook = self.registry.get(webhook_id, owner_id).await?;
        let event = Event::simple(
            owner_id,
            TEST_EVENT,
            serde_json::json!({
                "webhook_id": webhook.id,
                "message": "This is a test event",
            }),
        );

        let record = DeliveryRecord::for_event(&webhook.id, &event, self.executor.max_attempts())?;
        self.start(record.clone()).await?;

        tracing::info!(webhook_id = %webhook.id, delivery_id = %record.delivery_id, "Test event sent");
        Ok(record)
    }

    /// Sends a finished delivery's payload again as a new delivery.
    pub async fn redeliver(&self, delivery_id: &str, owner_id: &str) -> WebhookResult<DeliveryRecord> {
        let original = self
            .log
            .get(delivery_id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(delivery_id.to_string()))?;
        self.registry.get(&original.webhook_id, owner_id).await?;

        if !original.is_terminal() {
            return Err(WebhookError::DeliveryInProgress(delivery_id.to_string()));
        }

        let record = original.redelivery(self.executor.max_attempts());
        self.start(record.clone()).await?;

        tracing::info!(
            original = %delivery_id,
            delivery_id = %record.delivery_id,
            "Delivery replayed"
        );
        Ok(record)
    }

    /// Waits for every delivery started so far to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery task failed");
            }
        }
    }

    async fn start(&self, record: DeliveryRecord) -> WebhookResult<()> {
        self.log.upsert(&record).await?;

        let executor = self.executor.clone();
        let mut tasks = self.tasks.lock().await;
        // Reap finished deliveries so the set only tracks live ones
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery task failed");
            }
        }
        tasks.spawn(async move {
            executor.run(record).await;
        });
        Ok(())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Deliveries in flight run to a terminal state without the dispatcher
        self.tasks.get_mut().detach_all();
    }
}
