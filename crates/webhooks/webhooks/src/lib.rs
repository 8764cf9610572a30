//! # Marketplace Webhooks
//!
//! Outbound webhook delivery for marketplace account owners:
//! - Subscription management with per-webhook signing secrets
//! - Concurrent fan-out of platform events
//! - HMAC-SHA256 signed deliveries with bounded retries
//! - A queryable delivery log with failure analytics
//! - A receiver-side verification helper
//!
//! ## Example
//!
//! ```rust,ignore
//! use marketplace_webhooks::{WebhookConfig, WebhookSystem};
//!
//! let system = WebhookSystem::with_config(WebhookConfig::default())?;
//!
//! let webhook = system
//!     .registry()
//!     .create("acct_42", "billing", "https://example.com/hooks", ["credits.low"])
//!     .await?;
//!
//! let receipt = system
//!     .dispatcher()
//!     .publish("acct_42", "credits.low", serde_json::json!({ "balance": 120 }))
//!     .await?;
//! ```
//!
//! Receivers verify deliveries with [`WebhookReceiver`]:
//!
//! ```rust,ignore
//! let receiver = WebhookReceiver::new(secret);
//! let payload = receiver.verify_payload(signature_header, &raw_body)?;
//! ```

mod config;
mod delivery;
mod dispatcher;
mod error;
mod log;
mod notifier;
mod receiver;
mod record;
mod registry;
mod retry;
mod signature;
mod storage;
mod system;
mod transport;
mod webhook;

pub use config::{ConfigError, WebhookConfig, load_config};
pub use delivery::DeliveryExecutor;
pub use dispatcher::{Dispatcher, PublishReceipt};
pub use error::{WebhookError, WebhookResult};
pub use log::{DeliveryAggregate, DeliveryLog, InMemoryDeliveryLog};
pub use notifier::{ChannelNotifier, DeliveryAlert, FailureNotifier, TracingNotifier};
pub use receiver::{DEFAULT_TOLERANCE_SECS, VerificationError, WebhookPayload, WebhookReceiver};
pub use record::{DeliveryFailure, DeliveryOutcome, DeliveryRecord, DeliverySummary};
pub use registry::SubscriptionRegistry;
pub use retry::{ExponentialBackoff, FixedDelay, RetryStrategy};
pub use signature::{SignatureHeader, SignatureVersion, WebhookSigner, headers};
pub use storage::{InMemoryWebhookStore, WebhookChange, WebhookStore};
pub use system::{WebhookSystem, WebhookSystemBuilder};
#[cfg(feature = "http-client")]
pub use transport::HttpTransport;
pub use transport::{OutboundRequest, TransportError, TransportResponse, WebhookTransport};
pub use webhook::{Webhook, WebhookSecret, WebhookUpdate, validate_url};
