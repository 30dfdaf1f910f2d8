//! Notification events
//!
//! Summary events broadcast on the process-wide event bus. Stores publish
//! their detailed typed events to in-process listeners; a bridge listener
//! forwards a condensed copy here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::EvseStatus;

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A resource was added, changed or removed in a store
    ResourceChanged(ResourceChangedEvent),
    /// An EVSE moved to a new status without other changes
    EvseStatusChanged(EvseStatusChangedEvent),
    /// A remote party entry was added, replaced or removed
    RemotePartyChanged(RemotePartyChangedEvent),
    /// A credentials handshake completed
    PartyRegistered(PartyRegisteredEvent),
}

impl Event {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ResourceChanged(_) => "resource_changed",
            Event::EvseStatusChanged(_) => "evse_status_changed",
            Event::RemotePartyChanged(_) => "remote_party_changed",
            Event::PartyRegistered(_) => "party_registered",
        }
    }

    /// `CC*PID` of the party the event concerns
    pub fn party(&self) -> &str {
        match self {
            Event::ResourceChanged(e) => &e.party,
            Event::EvseStatusChanged(e) => &e.party,
            Event::RemotePartyChanged(e) => &e.party,
            Event::PartyRegistered(e) => &e.party,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChangedEvent {
    pub kind: String,
    pub party: String,
    pub id: String,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvseStatusChangedEvent {
    pub party: String,
    pub location_id: String,
    pub evse_uid: String,
    pub previous: EvseStatus,
    pub status: EvseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePartyChangedEvent {
    pub party: String,
    /// Display form, e.g. `DE*ABC (CPO)`
    pub remote_party: String,
    pub action: ChangeAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRegisteredEvent {
    pub party: String,
    pub version: String,
    pub roles: Vec<String>,
}

/// Event wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
