//! Webhook system - main entry point.

use std::sync::Arc;

use marketplace_events::EventCatalog;

use crate::config::WebhookConfig;
use crate::delivery::DeliveryExecutor;
use crate::dispatcher::Dispatcher;
use crate::error::{WebhookError, WebhookResult};
use crate::log::{DeliveryLog, InMemoryDeliveryLog};
use crate::notifier::{FailureNotifier, TracingNotifier};
use crate::registry::SubscriptionRegistry;
use crate::retry::RetryStrategy;
use crate::storage::{InMemoryWebhookStore, WebhookStore};
use crate::transport::WebhookTransport;

/// The assembled webhook system: registry, dispatcher and delivery log.
pub struct WebhookSystem {
    config: WebhookConfig,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    log: Arc<dyn DeliveryLog>,
}

impl WebhookSystem {
    /// Starts building a system with the given configuration.
    pub fn builder(config: WebhookConfig) -> WebhookSystemBuilder {
        WebhookSystemBuilder::new(config)
    }

    /// Creates a system with in-memory storage and the HTTP transport.
    #[cfg(feature = "http-client")]
    pub fn with_config(config: WebhookConfig) -> WebhookResult<Self> {
        Self::builder(config).build()
    }

    /// Subscription management.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Event publishing, test events and redelivery.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Delivery history.
    pub fn log(&self) -> &Arc<dyn DeliveryLog> {
        &self.log
    }

    /// Gets the configuration.
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }
}

/// Builder for [`WebhookSystem`]. Unset parts fall back to in-memory
/// storage, the standard event catalog, tracing alerts and the retry policy
/// from the configuration.
pub struct WebhookSystemBuilder {
    config: WebhookConfig,
    store: Option<Arc<dyn WebhookStore>>,
    log: Option<Arc<dyn DeliveryLog>>,
    transport: Option<Arc<dyn WebhookTransport>>,
    retry: Option<Arc<dyn RetryStrategy>>,
    notifier: Option<Arc<dyn FailureNotifier>>,
    catalog: Option<Arc<EventCatalog>>,
}

impl WebhookSystemBuilder {
    /// Creates a builder.
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            store: None,
            log: None,
            transport: None,
            retry: None,
            notifier: None,
            catalog: None,
        }
    }

    /// Sets the webhook store.
    pub fn store(mut self, store: Arc<dyn WebhookStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the delivery log.
    pub fn log(mut self, log: Arc<dyn DeliveryLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Sets the transport.
    pub fn transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the retry strategy built from the configuration.
    pub fn retry(mut self, retry: Arc<dyn RetryStrategy>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the failure notifier.
    pub fn notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the event catalog.
    pub fn catalog(mut self, catalog: Arc<EventCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validates the configuration and wires the system together.
    pub fn build(self) -> WebhookResult<WebhookSystem> {
        self.config
            .validate()
            .map_err(|e| WebhookError::Internal(e.to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.config)?,
        };
        let store: Arc<dyn WebhookStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryWebhookStore::new()),
        };
        let log: Arc<dyn DeliveryLog> = match self.log {
            Some(log) => log,
            None => Arc::new(InMemoryDeliveryLog::new()),
        };
        let retry: Arc<dyn RetryStrategy> = match self.retry {
            Some(retry) => retry,
            None => Arc::new(self.config.retry_strategy()),
        };
        let notifier: Arc<dyn FailureNotifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(TracingNotifier),
        };
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(EventCatalog::with_standard_events()));

        let registry = SubscriptionRegistry::new(store.clone(), log.clone(), catalog);
        let executor = Arc::new(DeliveryExecutor::new(
            store,
            log.clone(),
            transport,
            retry,
            notifier,
            &self.config,
        ));
        let dispatcher = Dispatcher::new(registry.clone(), log.clone(), executor);

        tracing::info!(
            max_attempts = self.config.max_attempts,
            request_timeout_ms = self.config.request_timeout_ms,
            "Webhook system initialized"
        );

        Ok(WebhookSystem {
            config: self.config,
            registry,
            dispatcher,
            log,
        })
    }
}

#[cfg(feature = "http-client")]
fn default_transport(config: &WebhookConfig) -> WebhookResult<Arc<dyn WebhookTransport>> {
    let transport = crate::transport::HttpTransport::new(&config.user_agent)
        .map_err(|e| WebhookError::Internal(e.to_string()))?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "http-client"))]
fn default_transport(_config: &WebhookConfig) -> WebhookResult<Arc<dyn WebhookTransport>> {
    Err(WebhookError::Internal(
        "no transport configured and the http-client feature is disabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "http-client")]
    #[tokio::test]
    async fn test_default_system() {
        let system = WebhookSystem::with_config(WebhookConfig::default()).unwrap();

        let webhook = system
            .registry()
            .create("acct_1", "alerts", "https://example.com/hook", ["usage.threshold"])
            .await
            .unwrap();

        let listed = system.registry().list("acct_1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, webhook.id);
        assert_eq!(system.config().max_attempts, 4);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = WebhookSystem::builder(WebhookConfig::default().max_attempts(0)).build();
        assert!(matches!(result, Err(WebhookError::Internal(_))));
    }
}
