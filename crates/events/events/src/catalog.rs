//! Event type catalog for discovery and validation.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{EventError, EventResult};
use crate::event::EventType;

/// Reserved event type used by webhook test deliveries.
///
/// It is registered in the standard catalog so it can be dispatched, but it is
/// never subscribable.
pub const TEST_EVENT: &str = "webhook.test";

/// Standard marketplace event names.
pub mod marketplace_events {
    /// Usage crossed a configured alert threshold.
    pub const USAGE_THRESHOLD: &str = "usage.threshold";
    /// Usage reached the plan limit.
    pub const USAGE_LIMIT_REACHED: &str = "usage.limit_reached";
    /// Credit balance dropped below the low-balance mark.
    pub const CREDITS_LOW: &str = "credits.low";
    /// Credit balance reached zero.
    pub const CREDITS_DEPLETED: &str = "credits.depleted";
}

/// Definition of an event type in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefinition {
    /// The event type.
    pub event_type: EventType,
    /// Human-readable description.
    pub description: String,
    /// Subsystem that emits this event.
    pub source: String,
}

impl EventDefinition {
    /// Creates a new event definition.
    pub fn new(
        event_type: EventType,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            description: description.into(),
            source: source.into(),
        }
    }

    /// Creates a simple event definition from a type string.
    pub fn simple(
        event_type: &str,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(EventType::from_string(event_type), description, source)
    }

    /// Returns the simple event type string.
    pub fn simple_type_string(&self) -> String {
        self.event_type.simple_string()
    }
}

/// Catalog of the event types the platform can publish.
///
/// Keyed by the simple type string; registering a newer version of an
/// existing type replaces the old definition.
pub struct EventCatalog {
    definitions: RwLock<HashMap<String, EventDefinition>>,
}

impl EventCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a catalog with the marketplace events pre-registered.
    pub fn with_standard_events() -> Self {
        let catalog = Self::new();

        catalog.register_all([
            EventDefinition::simple(
                marketplace_events::USAGE_THRESHOLD,
                "Emitted when API usage crosses an alert threshold",
                "usage",
            ),
            EventDefinition::simple(
                marketplace_events::USAGE_LIMIT_REACHED,
                "Emitted when API usage reaches the plan limit",
                "usage",
            ),
            EventDefinition::simple(
                marketplace_events::CREDITS_LOW,
                "Emitted when the credit balance runs low",
                "billing",
            ),
            EventDefinition::simple(
                marketplace_events::CREDITS_DEPLETED,
                "Emitted when the credit balance is exhausted",
                "billing",
            ),
            EventDefinition::simple(
                TEST_EVENT,
                "Synthetic event sent when an owner tests a webhook",
                "webhooks",
            ),
        ]);

        catalog
    }

    /// Registers an event definition.
    pub fn register(&self, definition: EventDefinition) {
        let mut defs = self.definitions.write().unwrap_or_else(|e| e.into_inner());
        defs.insert(definition.simple_type_string(), definition);
    }

    /// Registers multiple event definitions.
    pub fn register_all(&self, definitions: impl IntoIterator<Item = EventDefinition>) {
        let mut defs = self.definitions.write().unwrap_or_else(|e| e.into_inner());
        for def in definitions {
            defs.insert(def.simple_type_string(), def);
        }
    }

    /// Gets an event definition by type string.
    pub fn get(&self, event_type: &str) -> Option<EventDefinition> {
        let defs = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        defs.get(event_type).cloned()
    }

    /// Checks if an event type is registered.
    pub fn is_registered(&self, event_type: &str) -> bool {
        let defs = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        defs.contains_key(event_type)
    }

    /// Checks that every type in `event_types` is registered.
    pub fn validate<'a>(&self, event_types: impl IntoIterator<Item = &'a str>) -> EventResult<()> {
        let defs = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        for event_type in event_types {
            if !defs.contains_key(event_type) {
                return Err(EventError::UnknownEventType(event_type.to_string()));
            }
        }
        Ok(())
    }

    /// Returns all registered event definitions.
    pub fn all(&self) -> Vec<EventDefinition> {
        let defs = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = defs.values().cloned().collect();
        all.sort_by_key(|d| d.simple_type_string());
        all
    }

    /// Returns the number of registered events.
    pub fn len(&self) -> usize {
        let defs = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        defs.len()
    }

    /// Checks if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::with_standard_events()
    }
}
