//! Webhook subscription records.

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

use crate::error::{WebhookError, WebhookResult};

/// Signing secret of a webhook.
///
/// `Debug` and `Serialize` render a masked value; the raw secret is only
/// available through [`WebhookSecret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    /// Prefix of every generated secret.
    pub const PREFIX: &'static str = "whsec_";

    /// Generates a new secret from 32 bytes of OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(format!("{}{}", Self::PREFIX, hex::encode(bytes)))
    }

    /// Wraps an existing secret, e.g. one imported from another system.
    pub fn from_string(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the display form shown in listings.
    pub fn masked(&self) -> String {
        if self.0.starts_with(Self::PREFIX) {
            format!("{}****", Self::PREFIX)
        } else {
            "****".to_string()
        }
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookSecret").field(&self.masked()).finish()
    }
}

impl Serialize for WebhookSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}

/// A registered webhook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Webhook {
    /// Unique identifier.
    pub id: String,
    /// Owning account.
    pub owner_id: String,
    /// Human-readable name.
    pub name: String,
    /// Target URL (always https).
    pub url: String,
    /// Secret for signing payloads.
    pub secret: WebhookSecret,
    /// Subscribed event types (simple type strings).
    pub events: BTreeSet<String>,
    /// Whether the webhook receives dispatched events.
    pub active: bool,
    /// When the webhook was created.
    pub created_at: DateTime<Utc>,
    /// When the webhook was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Creates an active webhook with a freshly generated secret.
    ///
    /// Performs no validation; use [`crate::SubscriptionRegistry::create`].
    pub(crate) fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        events: BTreeSet<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("wh_{}", uuid::Uuid::new_v4().simple()),
            owner_id: owner_id.into(),
            name: name.into(),
            url: url.into(),
            secret: WebhookSecret::generate(),
            events,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks if this webhook should receive an event.
    pub fn should_receive(&self, event_type: &str) -> bool {
        self.active && self.events.contains(event_type)
    }

    /// Checks whether `owner_id` owns this webhook.
    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// Partial update of a webhook. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct WebhookUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New target URL; must pass the same checks as on create.
    pub url: Option<String>,
    /// Replacement event set, validated against the catalog.
    pub events: Option<Vec<String>>,
    /// Enables or disables delivery of new events.
    pub active: Option<bool>,
}

impl WebhookUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces the subscribed events.
    pub fn events(mut self, events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// Activates or deactivates the webhook.
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Checks if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none() && self.events.is_none() && self.active.is_none()
    }
}

/// Validates that `raw` is an absolute https URL with a host.
pub fn validate_url(raw: &str) -> WebhookResult<()> {
    let parsed = url::Url::parse(raw)?;

    if parsed.scheme() != "https" {
        return Err(WebhookError::InvalidUrl(format!(
            "{raw}: scheme must be https"
        )));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(WebhookError::InvalidUrl(format!("{raw}: missing host")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_secret_generation() {
        let a = WebhookSecret::generate();
        let b = WebhookSecret::generate();

        assert!(a.expose().starts_with("whsec_"));
        // 32 random bytes, hex encoded
        assert_eq!(a.expose().len(), "whsec_".len() + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_is_masked() {
        let secret = WebhookSecret::from_string("whsec_abc");

        assert_eq!(format!("{:?}", secret), "WebhookSecret(\"whsec_****\")");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"whsec_****\"");
        assert_eq!(WebhookSecret::from_string("legacy").masked(), "****");
    }

    #[test]
    fn test_webhook_serialization_hides_secret() {
        let webhook = Webhook::new("acct_1", "alerts", "https://example.com/hook", events(&["credits.low"]));
        let raw = webhook.secret.expose().to_string();

        let json = serde_json::to_string(&webhook).unwrap();
        assert!(!json.contains(&raw));
        assert!(!format!("{:?}", webhook).contains(&raw));
    }

    #[test]
    fn test_should_receive() {
        let mut webhook = Webhook::new(
            "acct_1",
            "alerts",
            "https://example.com/hook",
            events(&["credits.low", "credits.depleted"]),
        );

        assert!(webhook.should_receive("credits.low"));
        assert!(!webhook.should_receive("usage.threshold"));

        webhook.active = false;
        assert!(!webhook.should_receive("credits.low"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/hooks").is_ok());
        assert!(validate_url("https://hooks.example.com:8443/a?b=c").is_ok());

        assert!(matches!(validate_url("http://example.com"), Err(WebhookError::InvalidUrl(_))));
        assert!(matches!(validate_url("not a url"), Err(WebhookError::InvalidUrl(_))));
        assert!(matches!(validate_url("ftp://example.com"), Err(WebhookError::InvalidUrl(_))));
    }

    #[test]
    fn test_update_builder() {
        assert!(WebhookUpdate::new().is_empty());

        let update = WebhookUpdate::new().name("billing").active(false);
        assert_eq!(update.name.as_deref(), Some("billing"));
        assert_eq!(update.active, Some(false));
        assert!(update.url.is_none());
        assert!(!update.is_empty());
    }
}
