//! Location store with EVSE and Connector cascades
//!
//! EVSE and Connector mutations locate the owning Location, change the child,
//! bump the parents so that `location >= evse >= connector` holds for the
//! `last_updated` timestamps, and store the new Location. The whole cascade
//! runs inside one acquisition of the location store lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::patch;
use super::resource_store::{
    check_timestamp, insert, lookup, record, AddOrUpdateResult, DowngradeRule, Index,
    ResourceEvent, ResourceStore,
};
use crate::domain::location::{Connector, Evse, EvseStatus, Location};
use crate::domain::{
    ConnectorId, CountryCode, DomainError, DomainResult, EvseUid, LocationId, OcpiResource,
    PartyId, PartyKey,
};
use crate::notifications::{Listener, Listeners};

const EVSE_KIND: &str = "EVSE";
const CONNECTOR_KIND: &str = "Connector";

/// Decides whether an EVSE in status REMOVED stays in its Location
pub type KeepRemovedEvse = Arc<dyn Fn(&Evse) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum EvseEvent {
    Added {
        key: PartyKey,
        location_id: LocationId,
        evse: Evse,
    },
    Changed {
        key: PartyKey,
        location_id: LocationId,
        previous: Evse,
        current: Evse,
    },
    /// Only the status moved
    StatusChanged {
        key: PartyKey,
        location_id: LocationId,
        evse_uid: EvseUid,
        previous: EvseStatus,
        current: EvseStatus,
    },
    Removed {
        key: PartyKey,
        location_id: LocationId,
        evse: Evse,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Added {
        key: PartyKey,
        location_id: LocationId,
        evse_uid: EvseUid,
        connector: Connector,
    },
    Changed {
        key: PartyKey,
        location_id: LocationId,
        evse_uid: EvseUid,
        previous: Connector,
        current: Connector,
    },
}

/// Events produced by one cascade, dispatched after the lock is released
#[derive(Default)]
struct Pending {
    location: Option<ResourceEvent<Location>>,
    evse: Option<EvseEvent>,
    connector: Option<ConnectorEvent>,
}

fn later(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    a.max(b)
}

pub struct LocationStore {
    locations: ResourceStore<Location>,
    keep_removed_evse: KeepRemovedEvse,
    evse_listeners: Listeners<EvseEvent>,
    connector_listeners: Listeners<ConnectorEvent>,
}

impl LocationStore {
    /// Store that keeps REMOVED EVSEs as soft-deleted entries
    pub fn new(allow_downgrades: bool) -> Self {
        Self::with_policy(allow_downgrades, Arc::new(|_: &Evse| true))
    }

    pub fn with_policy(allow_downgrades: bool, keep_removed_evse: KeepRemovedEvse) -> Self {
        Self {
            locations: ResourceStore::new(allow_downgrades),
            keep_removed_evse,
            evse_listeners: Listeners::new(),
            connector_listeners: Listeners::new(),
        }
    }

    /// Store whose policy is a fixed keep/prune flag
    pub fn keeping_removed(allow_downgrades: bool, keep_removed_evses: bool) -> Self {
        Self::with_policy(allow_downgrades, Arc::new(move |_: &Evse| keep_removed_evses))
    }

    pub fn subscribe(&self, listener: impl Listener<ResourceEvent<Location>> + 'static) {
        self.locations.subscribe(listener);
    }

    pub fn subscribe_evses(&self, listener: impl Listener<EvseEvent> + 'static) {
        self.evse_listeners.subscribe(listener);
    }

    pub fn subscribe_connectors(&self, listener: impl Listener<ConnectorEvent> + 'static) {
        self.connector_listeners.subscribe(listener);
    }

    // Location level

    pub fn add_location(&self, location: Location) -> DomainResult<Location> {
        self.locations.add(location)
    }

    pub fn add_location_if_not_exists(&self, location: Location) -> Location {
        self.locations.add_if_not_exists(location)
    }

    pub fn add_or_update_location(
        &self,
        location: Location,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<AddOrUpdateResult<Location>> {
        self.locations.add_or_update(location, allow_downgrades)
    }

    pub fn try_patch_location(
        &self,
        existing: &Location,
        patch: &Value,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<Location> {
        self.locations.try_patch(existing, patch, allow_downgrades)
    }

    pub fn location_exists(&self, cc: &CountryCode, pid: &PartyId, id: &LocationId) -> bool {
        self.locations.exists(cc, pid, id)
    }

    pub fn try_get_location(
        &self,
        cc: &CountryCode,
        pid: &PartyId,
        id: &LocationId,
    ) -> Option<Location> {
        self.locations.try_get(cc, pid, id)
    }

    pub fn get_location(&self, cc: &CountryCode, pid: &PartyId, id: &LocationId) -> DomainResult<Location> {
        self.locations.get(cc, pid, id)
    }

    pub fn get_locations(&self, cc: Option<&CountryCode>, pid: Option<&PartyId>) -> Vec<Location> {
        self.locations.get_all(cc, pid)
    }

    pub fn get_locations_matching(&self, filter: impl Fn(&Location) -> bool) -> Vec<Location> {
        self.locations.get_all_matching(filter)
    }

    pub fn remove_location(&self, location: &Location) -> bool {
        self.locations.remove(location)
    }

    pub fn remove_all_locations(&self, filter: impl Fn(&Location) -> bool) -> usize {
        self.locations.remove_all(filter)
    }

    pub fn remove_locations_of_party(&self, cc: &CountryCode, pid: &PartyId) -> usize {
        self.locations.remove_all_for_party(cc, pid)
    }

    pub fn count(&self) -> usize {
        self.locations.count()
    }

    // EVSE level

    pub fn try_get_evse(
        &self,
        cc: &CountryCode,
        pid: &PartyId,
        location_id: &LocationId,
        uid: &EvseUid,
    ) -> Option<Evse> {
        self.try_get_location(cc, pid, location_id)?.evse(uid).cloned()
    }

    /// Insert or replace one EVSE of `location`
    pub fn add_or_update_evse(
        &self,
        location: &Location,
        evse: Evse,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<AddOrUpdateResult<Evse>> {
        let allow = allow_downgrades.unwrap_or(self.locations.allow_downgrades());
        let key = location.party_key();

        let (pending, was_created) = self.locations.with_index(|index| {
            let stored = Self::stored_location(index, &key, &location.id)?;
            let existing = stored.evse(&evse.uid).cloned();

            if let (Some(existing), false) = (&existing, allow) {
                check_timestamp(
                    EVSE_KIND,
                    &evse_key(&stored, &evse.uid),
                    existing.last_updated,
                    evse.last_updated,
                    DowngradeRule::Older,
                )
                .inspect_err(|_| record(EVSE_KIND, "stale"))?;
            }

            let evse_event = match &existing {
                None => EvseEvent::Added {
                    key: key.clone(),
                    location_id: stored.id.clone(),
                    evse: evse.clone(),
                },
                Some(previous) if previous.is_status_transition_of(&evse) => {
                    EvseEvent::StatusChanged {
                        key: key.clone(),
                        location_id: stored.id.clone(),
                        evse_uid: evse.uid.clone(),
                        previous: previous.status,
                        current: evse.status,
                    }
                }
                Some(previous) => EvseEvent::Changed {
                    key: key.clone(),
                    location_id: stored.id.clone(),
                    previous: previous.clone(),
                    current: evse.clone(),
                },
            };

            let mut pending = self.store_evse(index, stored, evse.clone())?;
            if pending.evse.is_none() {
                pending.evse = Some(evse_event);
            }
            Ok::<_, DomainError>((pending, existing.is_none()))
        })?;

        record(EVSE_KIND, if was_created { "added" } else { "updated" });
        debug!(key = %key, location_id = %location.id, evse_uid = %evse.uid, was_created, "EVSE stored");
        self.dispatch(pending);
        Ok(AddOrUpdateResult {
            data: evse,
            was_created,
        })
    }

    /// Merge `patch` onto one EVSE of `location`
    ///
    /// A patch touching only `status` and `last_updated` raises a single
    /// [`EvseEvent::StatusChanged`] instead of location and EVSE changes.
    pub fn try_patch_evse(
        &self,
        location: &Location,
        uid: &EvseUid,
        patch: &Value,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<Evse> {
        let allow = allow_downgrades.unwrap_or(self.locations.allow_downgrades());
        let key = location.party_key();
        let status_only = patch::is_status_only(patch);

        let (mut pending, patched) = self.locations.with_index(|index| {
            let stored = Self::stored_location(index, &key, &location.id)?;
            let current = stored
                .evse(uid)
                .cloned()
                .ok_or_else(|| DomainError::not_found(EVSE_KIND, evse_key(&stored, uid)))?;

            let patched: Evse = patch::apply(&current, patch).inspect_err(|_| record(EVSE_KIND, "invalid"))?;
            if &patched.uid != uid {
                record(EVSE_KIND, "invalid");
                return Err(DomainError::InvalidPatch(format!(
                    "patch must not change the uid of EVSE {}",
                    evse_key(&stored, uid)
                )));
            }
            if !allow {
                check_timestamp(
                    EVSE_KIND,
                    &evse_key(&stored, uid),
                    current.last_updated,
                    patched.last_updated,
                    DowngradeRule::Older,
                )
                .inspect_err(|_| record(EVSE_KIND, "stale"))?;
            }

            let location_id = stored.id.clone();
            let mut pending = self.store_evse(index, stored, patched.clone())?;
            if pending.evse.is_none() {
                pending.evse = Some(if status_only {
                    EvseEvent::StatusChanged {
                        key: key.clone(),
                        location_id,
                        evse_uid: uid.clone(),
                        previous: current.status,
                        current: patched.status,
                    }
                } else {
                    EvseEvent::Changed {
                        key: key.clone(),
                        location_id,
                        previous: current,
                        current: patched.clone(),
                    }
                });
            }
            Ok::<_, DomainError>((pending, patched))
        })?;

        if status_only {
            pending.location = None;
        }
        record(EVSE_KIND, "patched");
        debug!(key = %key, location_id = %location.id, evse_uid = %uid, status_only, "EVSE patched");
        self.dispatch(pending);
        Ok(patched)
    }

    /// Hard-delete one EVSE regardless of the keep policy
    pub fn remove_evse(&self, location: &Location, uid: &EvseUid) -> DomainResult<Evse> {
        let key = location.party_key();
        let (pending, removed) = self.locations.with_index(|index| {
            let stored = Self::stored_location(index, &key, &location.id)?;
            let mut updated = stored.clone();
            let removed = updated
                .remove_evse(uid)
                .ok_or_else(|| DomainError::not_found(EVSE_KIND, evse_key(&stored, uid)))?;
            updated.last_updated = later(stored.last_updated, Utc::now());
            insert(index, updated.clone());

            let pending = Pending {
                evse: Some(EvseEvent::Removed {
                    key: key.clone(),
                    location_id: updated.id.clone(),
                    evse: removed.clone(),
                }),
                location: Some(ResourceEvent::Changed {
                    previous: stored,
                    current: updated,
                }),
                connector: None,
            };
            Ok::<_, DomainError>((pending, removed))
        })?;

        record(EVSE_KIND, "removed");
        info!(key = %key, location_id = %location.id, evse_uid = %uid, "EVSE removed");
        self.dispatch(pending);
        Ok(removed)
    }

    // Connector level

    pub fn add_or_update_connector(
        &self,
        location: &Location,
        evse_uid: &EvseUid,
        connector: Connector,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<AddOrUpdateResult<Connector>> {
        let allow = allow_downgrades.unwrap_or(self.locations.allow_downgrades());
        let key = location.party_key();

        let (pending, was_created) = self.locations.with_index(|index| {
            let stored = Self::stored_location(index, &key, &location.id)?;
            let evse = stored
                .evse(evse_uid)
                .cloned()
                .ok_or_else(|| DomainError::not_found(EVSE_KIND, evse_key(&stored, evse_uid)))?;
            let existing = evse.connector(&connector.id).cloned();

            if let (Some(existing), false) = (&existing, allow) {
                check_timestamp(
                    CONNECTOR_KIND,
                    &connector_key(&stored, evse_uid, &connector.id),
                    existing.last_updated,
                    connector.last_updated,
                    DowngradeRule::Older,
                )
                .inspect_err(|_| record(CONNECTOR_KIND, "stale"))?;
            }

            let connector_event = match &existing {
                None => ConnectorEvent::Added {
                    key: key.clone(),
                    location_id: stored.id.clone(),
                    evse_uid: evse_uid.clone(),
                    connector: connector.clone(),
                },
                Some(previous) => ConnectorEvent::Changed {
                    key: key.clone(),
                    location_id: stored.id.clone(),
                    evse_uid: evse_uid.clone(),
                    previous: previous.clone(),
                    current: connector.clone(),
                },
            };

            let pending = self.store_connector(index, stored, evse, connector.clone(), connector_event)?;
            Ok::<_, DomainError>((pending, existing.is_none()))
        })?;

        record(CONNECTOR_KIND, if was_created { "added" } else { "updated" });
        debug!(key = %key, location_id = %location.id, evse_uid = %evse_uid, connector_id = %connector.id, was_created, "Connector stored");
        self.dispatch(pending);
        Ok(AddOrUpdateResult {
            data: connector,
            was_created,
        })
    }

    pub fn try_patch_connector(
        &self,
        location: &Location,
        evse_uid: &EvseUid,
        connector_id: &ConnectorId,
        patch: &Value,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<Connector> {
        let allow = allow_downgrades.unwrap_or(self.locations.allow_downgrades());
        let key = location.party_key();

        let (pending, patched) = self.locations.with_index(|index| {
            let stored = Self::stored_location(index, &key, &location.id)?;
            let evse = stored
                .evse(evse_uid)
                .cloned()
                .ok_or_else(|| DomainError::not_found(EVSE_KIND, evse_key(&stored, evse_uid)))?;
            let id = connector_key(&stored, evse_uid, connector_id);
            let current = evse
                .connector(connector_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(CONNECTOR_KIND, &id))?;

            let patched: Connector =
                patch::apply(&current, patch).inspect_err(|_| record(CONNECTOR_KIND, "invalid"))?;
            if &patched.id != connector_id {
                record(CONNECTOR_KIND, "invalid");
                return Err(DomainError::InvalidPatch(format!(
                    "patch must not change the id of connector {id}"
                )));
            }
            if !allow {
                check_timestamp(
                    CONNECTOR_KIND,
                    &id,
                    current.last_updated,
                    patched.last_updated,
                    DowngradeRule::Older,
                )
                .inspect_err(|_| record(CONNECTOR_KIND, "stale"))?;
            }

            let event = ConnectorEvent::Changed {
                key: key.clone(),
                location_id: stored.id.clone(),
                evse_uid: evse_uid.clone(),
                previous: current,
                current: patched.clone(),
            };
            let pending = self.store_connector(index, stored, evse, patched.clone(), event)?;
            Ok::<_, DomainError>((pending, patched))
        })?;

        record(CONNECTOR_KIND, "patched");
        debug!(key = %key, location_id = %location.id, evse_uid = %evse_uid, connector_id = %connector_id, "Connector patched");
        self.dispatch(pending);
        Ok(patched)
    }

    // Cascade helpers; all run with the index lock held

    fn stored_location(index: &Index<Location>, key: &PartyKey, id: &LocationId) -> DomainResult<Location> {
        lookup(index, key, id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(Location::KIND, format!("{key}*{id}")))
    }

    /// Put `evse` into `stored`, apply the keep policy and re-store the location
    fn store_evse(&self, index: &mut Index<Location>, stored: Location, evse: Evse) -> DomainResult<Pending> {
        let mut updated = stored.clone();
        updated.last_updated = later(stored.last_updated, evse.last_updated);

        let mut pending = Pending::default();
        if evse.is_removed() && !(self.keep_removed_evse)(&evse) {
            if updated.remove_evse(&evse.uid).is_some() {
                info!(location_id = %updated.id, evse_uid = %evse.uid, "Pruned removed EVSE");
            }
            pending.evse = Some(EvseEvent::Removed {
                key: updated.party_key(),
                location_id: updated.id.clone(),
                evse,
            });
        } else {
            updated.upsert_evse(evse);
        }

        Self::restore(index, &stored, &updated)?;
        pending.location = Some(ResourceEvent::Changed {
            previous: stored,
            current: updated,
        });
        Ok(pending)
    }

    fn store_connector(
        &self,
        index: &mut Index<Location>,
        stored: Location,
        mut evse: Evse,
        connector: Connector,
        event: ConnectorEvent,
    ) -> DomainResult<Pending> {
        let previous_evse = evse.clone();
        evse.last_updated = later(evse.last_updated, connector.last_updated);
        evse.upsert_connector(connector);

        let mut updated = stored.clone();
        updated.last_updated = later(stored.last_updated, evse.last_updated);
        updated.upsert_evse(evse.clone());

        Self::restore(index, &stored, &updated)?;
        Ok(Pending {
            location: Some(ResourceEvent::Changed {
                previous: stored,
                current: updated.clone(),
            }),
            evse: Some(EvseEvent::Changed {
                key: updated.party_key(),
                location_id: updated.id.clone(),
                previous: previous_evse,
                current: evse,
            }),
            connector: Some(event),
        })
    }

    /// Re-store the parent with downgrades forced off
    fn restore(index: &mut Index<Location>, stored: &Location, updated: &Location) -> DomainResult<()> {
        check_timestamp(
            Location::KIND,
            &stored.display_key(),
            stored.last_updated,
            updated.last_updated,
            DowngradeRule::Older,
        )?;
        insert(index, updated.clone());
        record(Location::KIND, "updated");
        Ok(())
    }

    fn dispatch(&self, pending: Pending) {
        if let Some(event) = pending.location {
            self.locations.notify(event);
        }
        if let Some(event) = pending.evse {
            self.evse_listeners.dispatch(EVSE_KIND, &event);
        }
        if let Some(event) = pending.connector {
            self.connector_listeners.dispatch(CONNECTOR_KIND, &event);
        }
    }
}

fn evse_key(location: &Location, uid: &EvseUid) -> String {
    format!("{}*{}", location.display_key(), uid)
}

fn connector_key(location: &Location, uid: &EvseUid, id: &ConnectorId) -> String {
    format!("{}*{}*{}", location.display_key(), uid, id)
}
