//! Webhook storage trait for persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{WebhookError, WebhookResult};
use crate::webhook::Webhook;

/// Mutation applied to a stored webhook under the store's lock.
pub type WebhookChange = Box<dyn FnOnce(&mut Webhook) -> WebhookResult<()> + Send>;

/// Trait for webhook subscription storage backends.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Inserts a new webhook.
    async fn insert(&self, webhook: &Webhook) -> WebhookResult<()>;

    /// Gets a webhook by ID.
    async fn get(&self, id: &str) -> WebhookResult<Option<Webhook>>;

    /// Lists the webhooks of an owner, oldest first.
    async fn list_by_owner(&self, owner_id: &str) -> WebhookResult<Vec<Webhook>>;

    /// Applies `change` atomically and returns the stored result.
    ///
    /// If `change` fails, the stored webhook is left untouched.
    async fn modify(&self, id: &str, change: WebhookChange) -> WebhookResult<Webhook>;

    /// Deletes a webhook, returning it if it existed.
    async fn delete(&self, id: &str) -> WebhookResult<Option<Webhook>>;
}

/// In-memory webhook storage.
pub struct InMemoryWebhookStore {
    webhooks: RwLock<HashMap<String, Webhook>>,
}

impl InMemoryWebhookStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self {
            webhooks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWebhookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn insert(&self, webhook: &Webhook) -> WebhookResult<()> {
        let mut webhooks = self.webhooks.write().await;
        if webhooks.contains_key(&webhook.id) {
            return Err(WebhookError::StorageError(format!(
                "duplicate webhook id {}",
                webhook.id
            )));
        }
        webhooks.insert(webhook.id.clone(), webhook.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> WebhookResult<Option<Webhook>> {
        let webhooks = self.webhooks.read().await;
        Ok(webhooks.get(id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> WebhookResult<Vec<Webhook>> {
        let webhooks = self.webhooks.read().await;
        let mut owned: Vec<Webhook> = webhooks
            .values()
            .filter(|w| w.is_owned_by(owner_id))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn modify(&self, id: &str, change: WebhookChange) -> WebhookResult<Webhook> {
        let mut webhooks = self.webhooks.write().await;
        let stored = webhooks
            .get_mut(id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        let mut updated = stored.clone();
        change(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> WebhookResult<Option<Webhook>> {
        let mut webhooks = self.webhooks.write().await;
        Ok(webhooks.remove(id))
    }
}
