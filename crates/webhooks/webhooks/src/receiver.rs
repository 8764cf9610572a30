//! Receiver-side verification of signed deliveries.
//!
//! The platform never runs this on its delivery path. It is the algorithm
//! customer endpoints implement, shipped here so receivers written in Rust can
//! reuse it and so the signer is tested against it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::signature::{SignatureHeader, WebhookSigner};

/// Default replay window in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Reasons a receiver rejects a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Header is missing `t` or `v1`, or `t` is not a timestamp.
    #[error("Malformed signature header")]
    MalformedSignature,

    /// Timestamp is outside the replay window.
    #[error("Signature timestamp outside tolerance")]
    StaleSignature,

    /// No signature matches the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature is valid but the body is not a delivery envelope.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Parsed delivery envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Delivery id (same as `X-Webhook-Id`).
    pub id: String,
    /// Event type.
    pub event: String,
    /// When the delivery was created (RFC 3339).
    pub created_at: String,
    /// Event data.
    pub data: Value,
}

/// Webhook receiver for verifying incoming deliveries.
pub struct WebhookReceiver {
    signer: WebhookSigner,
    /// Tolerance for timestamp validation (in seconds).
    tolerance_secs: i64,
}

impl WebhookReceiver {
    /// Creates a new webhook receiver.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            signer: WebhookSigner::new(secret),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Sets the timestamp tolerance.
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies a signature header against the raw body using the current time.
    pub fn verify(&self, header: &str, body: &[u8]) -> Result<(), VerificationError> {
        self.verify_at(header, body, Utc::now().timestamp())
    }

    /// Verifies a signature header against the raw body at time `now`.
    ///
    /// The timestamp is checked before the MAC, so a stale header is rejected
    /// even when its signature is correct.
    pub fn verify_at(&self, header: &str, body: &[u8], now: i64) -> Result<(), VerificationError> {
        let parsed = SignatureHeader::parse(header).ok_or(VerificationError::MalformedSignature)?;

        if now.abs_diff(parsed.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(VerificationError::StaleSignature);
        }

        if parsed
            .signatures
            .iter()
            .any(|signature| self.signer.verify(signature, parsed.timestamp, body))
        {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature)
        }
    }

    /// Verifies the delivery and parses the envelope.
    pub fn verify_payload(&self, header: &str, body: &[u8]) -> Result<WebhookPayload, VerificationError> {
        self.verify(header, body)?;
        serde_json::from_slice(body).map_err(|e| VerificationError::InvalidPayload(e.to_string()))
    }
}
