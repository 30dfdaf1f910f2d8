//! Notifications module
//!
//! Two layers:
//! - [`Listeners`]: typed, synchronous, isolated callbacks registered on a
//!   store or on the party registry
//! - [`EventBus`]: process-wide broadcast of condensed events for
//!   asynchronous consumers
//!
//! # Usage
//! ```ignore
//! use texnouz_ocpi::notifications::{create_event_bus, Event, ChangeAction, ResourceChangedEvent};
//!
//! let event_bus = create_event_bus();
//! event_bus.publish(Event::ResourceChanged(ResourceChangedEvent {
//!     kind: "Location".to_string(),
//!     party: "NL*TNX".to_string(),
//!     id: "LOC1".to_string(),
//!     action: ChangeAction::Changed,
//! }));
//! ```

pub mod event_bus;
pub mod events;
pub mod listeners;

pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
pub use events::*;
pub use listeners::{Listener, ListenerError, ListenerResult, Listeners};
