//! # Marketplace Events
//!
//! Event model shared by the marketplace platform and its webhook system:
//! - Typed events with namespaces and versioning
//! - An extensible catalog of the event types the platform publishes
//!
//! ## Example
//!
//! ```rust,ignore
//! use marketplace_events::{Event, EventCatalog};
//!
//! let catalog = EventCatalog::with_standard_events();
//! assert!(catalog.is_registered("credits.low"));
//!
//! let event = Event::simple("acct_42", "credits.low", serde_json::json!({ "balance": 120 }));
//! ```

mod catalog;
mod error;
mod event;

pub use catalog::{EventCatalog, EventDefinition, TEST_EVENT, marketplace_events};
pub use error::{EventError, EventResult};
pub use event::{Event, EventType};
