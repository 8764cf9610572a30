//! Subscription registry: owner-facing webhook management.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

use marketplace_events::{EventCatalog, TEST_EVENT};

use crate::error::{WebhookError, WebhookResult};
use crate::log::DeliveryLog;
use crate::storage::{WebhookChange, WebhookStore};
use crate::webhook::{Webhook, WebhookSecret, WebhookUpdate, validate_url};

/// Creates, updates and removes webhooks on behalf of their owners.
///
/// Every operation that names a webhook checks that the caller owns it.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn WebhookStore>,
    log: Arc<dyn DeliveryLog>,
    catalog: Arc<EventCatalog>,
}

impl SubscriptionRegistry {
    /// Creates a registry over the given stores.
    pub fn new(store: Arc<dyn WebhookStore>, log: Arc<dyn DeliveryLog>, catalog: Arc<EventCatalog>) -> Self {
        Self { store, log, catalog }
    }

    /// Returns the event catalog subscriptions are validated against.
    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Registers a new webhook with a freshly generated secret.
    pub async fn create(
        &self,
        owner_id: &str,
        name: impl Into<String>,
        url: &str,
        events: impl IntoIterator<Item = impl Into<String>>,
    ) -> WebhookResult<Webhook> {
        validate_url(url)?;
        let events = self.validate_events(events.into_iter().map(Into::into).collect())?;

        let webhook = Webhook::new(owner_id, name, url, events);
        self.store.insert(&webhook).await?;

        tracing::info!(
            webhook_id = %webhook.id,
            owner_id = %owner_id,
            events = webhook.events.len(),
            "Webhook created"
        );
        Ok(webhook)
    }

    /// Applies a partial update. The secret is never changed here.
    pub async fn update(&self, id: &str, owner_id: &str, update: WebhookUpdate) -> WebhookResult<Webhook> {
        if update.is_empty() {
            return self.get(id, owner_id).await;
        }

        if let Some(url) = &update.url {
            validate_url(url)?;
        }
        let events = match update.events {
            Some(events) => Some(self.validate_events(events.into_iter().collect())?),
            None => None,
        };

        let owner = owner_id.to_string();
        let WebhookUpdate { name, url, active, .. } = update;
        let change: WebhookChange = Box::new(move |webhook| {
            ensure_owner(webhook, &owner)?;
            if let Some(name) = name {
                webhook.name = name;
            }
            if let Some(url) = url {
                webhook.url = url;
            }
            if let Some(events) = events {
                webhook.events = events;
            }
            if let Some(active) = active {
                webhook.active = active;
            }
            webhook.updated_at = Utc::now();
            Ok(())
        });

        let webhook = self.store.modify(id, change).await?;
        tracing::info!(webhook_id = %id, active = webhook.active, "Webhook updated");
        Ok(webhook)
    }

    /// Replaces the webhook's secret. Attempts signed after this call use the
    /// new secret.
    pub async fn rotate_secret(&self, id: &str, owner_id: &str) -> WebhookResult<Webhook> {
        let owner = owner_id.to_string();
        let change: WebhookChange = Box::new(move |webhook| {
            ensure_owner(webhook, &owner)?;
            webhook.secret = WebhookSecret::generate();
            webhook.updated_at = Utc::now();
            Ok(())
        });

        let webhook = self.store.modify(id, change).await?;
        tracing::info!(webhook_id = %id, "Webhook secret rotated");
        Ok(webhook)
    }

    /// Removes a webhook and every delivery record it owns.
    pub async fn delete(&self, id: &str, owner_id: &str) -> WebhookResult<Webhook> {
        self.get(id, owner_id).await?;

        let webhook = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;
        let removed = self.log.delete_for_webhook(id).await?;

        tracing::info!(webhook_id = %id, deliveries_removed = removed, "Webhook deleted");
        Ok(webhook)
    }

    /// Lists the owner's webhooks, oldest first.
    pub async fn list(&self, owner_id: &str) -> WebhookResult<Vec<Webhook>> {
        self.store.list_by_owner(owner_id).await
    }

    /// Gets one of the owner's webhooks.
    pub async fn get(&self, id: &str, owner_id: &str) -> WebhookResult<Webhook> {
        let webhook = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;
        ensure_owner(&webhook, owner_id)?;
        Ok(webhook)
    }

    fn validate_events(&self, events: BTreeSet<String>) -> WebhookResult<BTreeSet<String>> {
        if events.is_empty() {
            return Err(WebhookError::EmptyEventSet);
        }
        if events.contains(TEST_EVENT) {
            return Err(WebhookError::UnknownEventType(TEST_EVENT.to_string()));
        }
        self.catalog.validate(events.iter().map(String::as_str))?;
        Ok(events)
    }
}

fn ensure_owner(webhook: &Webhook, owner_id: &str) -> WebhookResult<()> {
    if webhook.is_owned_by(owner_id) {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized(webhook.id.clone()))
    }
}
