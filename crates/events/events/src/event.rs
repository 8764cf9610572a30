//! Event types and structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A platform event published on behalf of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event instance.
    pub id: String,
    /// Account that owns the event (and the webhooks it fans out to).
    pub owner_id: String,
    /// The event type (namespace + name + version).
    pub event_type: EventType,
    /// The event payload.
    pub payload: Value,
    /// Timestamp when the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event with the given type and payload.
    pub fn new(owner_id: impl Into<String>, event_type: EventType, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Creates a new event from a simple type string (e.g., "credits.low").
    pub fn simple(owner_id: impl Into<String>, event_type: &str, payload: Value) -> Self {
        Self::new(owner_id, EventType::from_string(event_type), payload)
    }

    /// Returns the wire type string without version (e.g., "credits.low").
    pub fn simple_type_string(&self) -> String {
        self.event_type.simple_string()
    }
}

/// Event type identifier with namespace, name, and version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventType {
    /// Namespace (e.g., "usage", "credits").
    pub namespace: String,
    /// Event name (e.g., "threshold", "low").
    pub name: String,
    /// Schema version for this event type.
    pub version: u32,
}

impl EventType {
    /// Creates a new event type.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: 1,
        }
    }

    /// Creates an event type with a specific version.
    pub fn versioned(namespace: impl Into<String>, name: impl Into<String>, version: u32) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    /// Parses an event type from a string like "credits.low" or "credits.low.v2".
    pub fn from_string(s: &str) -> Self {
        let parts: Vec<&str> = s.split('.').collect();

        match parts.len() {
            0 => Self::new("unknown", "unknown"),
            1 => Self::new("unknown", parts[0]),
            2 => Self::new(parts[0], parts[1]),
            _ => {
                if let Some(version) = parts
                    .last()
                    .and_then(|last| last.strip_prefix('v'))
                    .and_then(|v| v.parse::<u32>().ok())
                {
                    let name = parts[1..parts.len() - 1].join(".");
                    return Self::versioned(parts[0], name, version);
                }
                Self::new(parts[0], parts[1..].join("."))
            }
        }
    }

    /// Returns the simple string without version (e.g., "usage.limit_reached").
    ///
    /// This is the form carried in the `X-Webhook-Event` header and stored in
    /// webhook subscriptions.
    pub fn simple_string(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.v{}", self.namespace, self.name, self.version)
    }
}
