//! Delivery policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::ExponentialBackoff;

/// Webhook system configuration.
///
/// Every key is optional when loaded from TOML; missing keys take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Attempts per delivery, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub backoff_base_ms: u64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: u32,
    /// Upper bound for a single delay.
    pub max_backoff_ms: u64,
    /// Random extra delay, as a fraction of the computed delay.
    pub backoff_jitter: f64,
    /// Per-attempt timeout.
    pub request_timeout_ms: u64,
    /// Replay window receivers are expected to enforce.
    pub replay_tolerance_secs: i64,
    /// Bytes of the endpoint's response kept in the delivery log.
    pub response_body_limit: usize,
    /// `User-Agent` of outbound requests.
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_base_ms: 1_000,
            backoff_multiplier: 5,
            max_backoff_ms: 25_000,
            backoff_jitter: 0.0,
            request_timeout_ms: 10_000,
            replay_tolerance_secs: 300,
            response_body_limit: 1_024,
            user_agent: format!("marketplace-webhooks/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WebhookConfig {
    /// Creates a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Sets the base backoff delay.
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self
    }

    /// Sets the maximum backoff delay.
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the response body limit.
    pub fn response_body_limit(mut self, limit: usize) -> Self {
        self.response_body_limit = limit;
        self
    }

    /// Returns the per-attempt timeout.
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Builds the retry strategy described by this configuration.
    pub fn retry_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new()
            .base(Duration::from_millis(self.backoff_base_ms))
            .multiplier(self.backoff_multiplier)
            .max_delay(Duration::from_millis(self.max_backoff_ms))
            .max_attempts(self.max_attempts)
            .jitter(self.backoff_jitter)
    }

    /// Worst-case time from first attempt to terminal state.
    pub fn worst_case_latency(&self) -> Duration {
        let per_attempt = Duration::from_millis(self.request_timeout_ms + self.max_backoff_ms);
        per_attempt.saturating_mul(self.max_attempts)
    }

    /// Checks that the configuration can drive deliveries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.backoff_multiplier == 0 {
            return Err(ConfigError::Invalid("backoff_multiplier must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.replay_tolerance_secs <= 0 {
            return Err(ConfigError::Invalid("replay_tolerance_secs must be positive".into()));
        }
        Ok(())
    }

    /// Parses the `[webhooks]` table of a TOML document.
    ///
    /// A document without the table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let config: WebhookConfig = document
            .get("webhooks")
            .map(|v| toml::Value::try_into(v.clone()))
            .transpose()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?
            .unwrap_or_default();

        config.validate()?;
        Ok(config)
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &str) -> Result<WebhookConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    WebhookConfig::from_toml_str(&content)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryStrategy;

    #[test]
    fn test_default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.request_timeout_duration(), Duration::from_secs(10));
        assert_eq!(config.replay_tolerance_secs, 300);
        assert!(config.validate().is_ok());

        let retry = config.retry_strategy();
        assert_eq!(retry.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(retry.next_delay(3), Some(Duration::from_secs(25)));
        assert_eq!(retry.next_delay(4), None);
    }

    #[test]
    fn test_worst_case_latency() {
        let config = WebhookConfig::default();
        assert_eq!(config.worst_case_latency(), Duration::from_secs(4 * (10 + 25)));
    }

    #[test]
    fn test_from_toml() {
        let config = WebhookConfig::from_toml_str(
            r#"
            [webhooks]
            max_attempts = 6
            request_timeout_ms = 5000
            user_agent = "acme-hooks/2"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.user_agent, "acme-hooks/2");
        assert_eq!(config.backoff_multiplier, 5);
    }

    #[test]
    fn test_missing_table_uses_defaults() {
        let config = WebhookConfig::from_toml_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(config, WebhookConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = WebhookConfig::from_toml_str("[webhooks]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = WebhookConfig::from_toml_str("[webhooks]\nmax_attempts = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/webhooks.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
