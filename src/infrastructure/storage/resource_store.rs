//! Multi-tenant, downgrade-protected in-memory resource store
//!
//! Resources are indexed by owning party and then by id. Every operation
//! takes the store lock for its full duration; listeners run after the lock
//! has been released.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use super::patch;
use crate::domain::{
    CountryCode, DomainError, DomainResult, OcpiResource, PartyId, PartyKey,
};
use crate::notifications::{Listener, Listeners};

/// Two-level index: owning party, then resource id
pub(crate) type Index<R> = BTreeMap<PartyKey, BTreeMap<<R as OcpiResource>::Id, R>>;

/// Change notification raised by a [`ResourceStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<R> {
    Added(R),
    Changed { previous: R, current: R },
    Removed(R),
}

impl<R: OcpiResource> ResourceEvent<R> {
    pub fn resource(&self) -> &R {
        match self {
            Self::Added(r) | Self::Removed(r) => r,
            Self::Changed { current, .. } => current,
        }
    }
}

/// Outcome of an add-or-update
#[derive(Debug, Clone, PartialEq)]
pub struct AddOrUpdateResult<T> {
    pub data: T,
    pub was_created: bool,
}

/// Which timestamps count as a downgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DowngradeRule {
    /// Resource level: equal or older is rejected
    NotNewer,
    /// EVSE/Connector cascade: only strictly older is rejected
    Older,
}

pub(crate) fn check_timestamp(
    kind: &'static str,
    id: &dyn fmt::Display,
    stored: DateTime<Utc>,
    incoming: DateTime<Utc>,
    rule: DowngradeRule,
) -> DomainResult<()> {
    let rejected = match rule {
        DowngradeRule::NotNewer => incoming <= stored,
        DowngradeRule::Older => incoming < stored,
    };
    if rejected {
        warn!(kind, id = %id, %stored, %incoming, "Rejected stale update");
        return Err(DomainError::StaleUpdate {
            kind,
            id: id.to_string(),
            stored,
            incoming,
        });
    }
    Ok(())
}

pub(crate) fn record(kind: &'static str, outcome: &'static str) {
    metrics::counter!("ocpi_store_mutations_total", "kind" => kind, "outcome" => outcome)
        .increment(1);
}

pub(crate) fn lookup<'a, R: OcpiResource>(
    index: &'a Index<R>,
    key: &PartyKey,
    id: &R::Id,
) -> Option<&'a R> {
    index.get(key).and_then(|resources| resources.get(id))
}

pub(crate) fn insert<R: OcpiResource>(index: &mut Index<R>, resource: R) -> Option<R> {
    index
        .entry(resource.party_key())
        .or_default()
        .insert(resource.id().clone(), resource)
}

/// Remove one resource and prune the party node once it is empty
pub(crate) fn take<R: OcpiResource>(
    index: &mut Index<R>,
    key: &PartyKey,
    id: &R::Id,
) -> Option<R> {
    let resources = index.get_mut(key)?;
    let removed = resources.remove(id);
    if resources.is_empty() {
        index.remove(key);
    }
    removed
}

fn matches_party(key: &PartyKey, country_code: Option<&CountryCode>, party_id: Option<&PartyId>) -> bool {
    country_code.map_or(true, |cc| &key.country_code == cc)
        && party_id.map_or(true, |pid| &key.party_id == pid)
}

/// Store for one resource kind
pub struct ResourceStore<R: OcpiResource> {
    inner: RwLock<Index<R>>,
    allow_downgrades: bool,
    listeners: Listeners<ResourceEvent<R>>,
}

impl<R: OcpiResource> ResourceStore<R> {
    pub fn new(allow_downgrades: bool) -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            allow_downgrades,
            listeners: Listeners::new(),
        }
    }

    pub fn allow_downgrades(&self) -> bool {
        self.allow_downgrades
    }

    pub fn subscribe(&self, listener: impl Listener<ResourceEvent<R>> + 'static) {
        self.listeners.subscribe(listener);
    }

    /// Insert a new resource, failing when the triple is taken
    pub fn add(&self, resource: R) -> DomainResult<R> {
        let result = {
            let mut index = self.inner.write();
            if lookup(&index, &resource.party_key(), resource.id()).is_some() {
                Err(DomainError::already_exists(R::KIND, resource.display_key()))
            } else {
                insert(&mut index, resource.clone());
                Ok(resource)
            }
        };

        match &result {
            Ok(resource) => {
                record(R::KIND, "added");
                debug!(kind = R::KIND, key = %resource.display_key(), "Resource added");
                self.notify(ResourceEvent::Added(resource.clone()));
            }
            Err(_) => record(R::KIND, "conflict"),
        }
        result
    }

    /// Insert unless present; returns whichever copy ends up stored
    pub fn add_if_not_exists(&self, resource: R) -> R {
        let existing = {
            let mut index = self.inner.write();
            match lookup(&index, &resource.party_key(), resource.id()) {
                Some(existing) => Some(existing.clone()),
                None => {
                    insert(&mut index, resource.clone());
                    None
                }
            }
        };

        match existing {
            Some(existing) => existing,
            None => {
                record(R::KIND, "added");
                debug!(kind = R::KIND, key = %resource.display_key(), "Resource added");
                self.notify(ResourceEvent::Added(resource.clone()));
                resource
            }
        }
    }

    pub fn add_or_update(
        &self,
        resource: R,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<AddOrUpdateResult<R>> {
        let allow = allow_downgrades.unwrap_or(self.allow_downgrades);
        let outcome = {
            let mut index = self.inner.write();
            match lookup(&index, &resource.party_key(), resource.id()) {
                Some(stored) => {
                    if !allow {
                        check_timestamp(
                            R::KIND,
                            &resource.display_key(),
                            stored.last_updated(),
                            resource.last_updated(),
                            DowngradeRule::NotNewer,
                        )
                        .inspect_err(|_| record(R::KIND, "stale"))?;
                    }
                    insert(&mut index, resource.clone())
                }
                None => {
                    insert(&mut index, resource.clone());
                    None
                }
            }
        };

        let was_created = outcome.is_none();
        let event = match outcome {
            Some(previous) => ResourceEvent::Changed {
                previous,
                current: resource.clone(),
            },
            None => ResourceEvent::Added(resource.clone()),
        };
        record(R::KIND, if was_created { "added" } else { "updated" });
        debug!(kind = R::KIND, key = %resource.display_key(), was_created, "Resource stored");
        self.notify(event);

        Ok(AddOrUpdateResult {
            data: resource,
            was_created,
        })
    }

    /// Merge `patch` onto the stored copy of `existing`
    pub fn try_patch(
        &self,
        existing: &R,
        patch: &Value,
        allow_downgrades: Option<bool>,
    ) -> DomainResult<R> {
        let allow = allow_downgrades.unwrap_or(self.allow_downgrades);
        let key = existing.party_key();
        let (previous, patched) = {
            let mut index = self.inner.write();
            let stored = lookup(&index, &key, existing.id())
                .cloned()
                .ok_or_else(|| DomainError::not_found(R::KIND, existing.display_key()))?;

            let patched = patch::apply(&stored, patch).inspect_err(|_| record(R::KIND, "invalid"))?;
            if patched.party_key() != key || patched.id() != stored.id() {
                record(R::KIND, "invalid");
                return Err(DomainError::InvalidPatch(format!(
                    "patch must not change the identity of {}",
                    stored.display_key()
                )));
            }
            if !allow {
                check_timestamp(
                    R::KIND,
                    &stored.display_key(),
                    stored.last_updated(),
                    patched.last_updated(),
                    DowngradeRule::NotNewer,
                )
                .inspect_err(|_| record(R::KIND, "stale"))?;
            }
            insert(&mut index, patched.clone());
            (stored, patched)
        };

        record(R::KIND, "patched");
        debug!(kind = R::KIND, key = %patched.display_key(), "Resource patched");
        self.notify(ResourceEvent::Changed {
            previous,
            current: patched.clone(),
        });
        Ok(patched)
    }

    pub fn exists(&self, country_code: &CountryCode, party_id: &PartyId, id: &R::Id) -> bool {
        let key = PartyKey::new(country_code.clone(), party_id.clone());
        lookup(&self.inner.read(), &key, id).is_some()
    }

    pub fn try_get(&self, country_code: &CountryCode, party_id: &PartyId, id: &R::Id) -> Option<R> {
        let key = PartyKey::new(country_code.clone(), party_id.clone());
        lookup(&self.inner.read(), &key, id).cloned()
    }

    pub fn get(&self, country_code: &CountryCode, party_id: &PartyId, id: &R::Id) -> DomainResult<R> {
        self.try_get(country_code, party_id, id).ok_or_else(|| {
            DomainError::not_found(R::KIND, format!("{country_code}*{party_id}*{id}"))
        })
    }

    /// Every resource, or the subtree selected by country and/or party
    pub fn get_all(&self, country_code: Option<&CountryCode>, party_id: Option<&PartyId>) -> Vec<R> {
        let index = self.inner.read();
        match (country_code, party_id) {
            (Some(cc), Some(pid)) => index
                .get(&PartyKey::new(cc.clone(), pid.clone()))
                .map(|resources| resources.values().cloned().collect())
                .unwrap_or_default(),
            _ => index
                .iter()
                .filter(|(key, _)| matches_party(key, country_code, party_id))
                .flat_map(|(_, resources)| resources.values().cloned())
                .collect(),
        }
    }

    pub fn get_all_matching(&self, filter: impl Fn(&R) -> bool) -> Vec<R> {
        self.inner
            .read()
            .values()
            .flat_map(|resources| resources.values())
            .filter(|r| filter(r))
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().values().map(BTreeMap::len).sum()
    }

    pub fn remove(&self, resource: &R) -> bool {
        self.remove_by_id(resource.country_code(), resource.party_id(), resource.id())
            .is_some()
    }

    pub fn remove_by_id(
        &self,
        country_code: &CountryCode,
        party_id: &PartyId,
        id: &R::Id,
    ) -> Option<R> {
        let key = PartyKey::new(country_code.clone(), party_id.clone());
        let removed = take(&mut self.inner.write(), &key, id)?;
        record(R::KIND, "removed");
        debug!(kind = R::KIND, key = %removed.display_key(), "Resource removed");
        self.notify(ResourceEvent::Removed(removed.clone()));
        Some(removed)
    }

    /// Remove every resource accepted by `filter`; returns the count
    pub fn remove_all(&self, filter: impl Fn(&R) -> bool) -> usize {
        let removed: Vec<R> = {
            let mut index = self.inner.write();
            let mut removed = Vec::new();
            index.retain(|_, resources| {
                let doomed: Vec<R::Id> = resources
                    .values()
                    .filter(|r| filter(r))
                    .map(|r| r.id().clone())
                    .collect();
                for id in doomed {
                    if let Some(r) = resources.remove(&id) {
                        removed.push(r);
                    }
                }
                !resources.is_empty()
            });
            removed
        };
        self.notify_removed(removed)
    }

    pub fn remove_all_for_party(&self, country_code: &CountryCode, party_id: &PartyId) -> usize {
        let key = PartyKey::new(country_code.clone(), party_id.clone());
        let removed: Vec<R> = self
            .inner
            .write()
            .remove(&key)
            .map(|resources| resources.into_values().collect())
            .unwrap_or_default();
        self.notify_removed(removed)
    }

    fn notify_removed(&self, removed: Vec<R>) -> usize {
        let count = removed.len();
        if count > 0 {
            debug!(kind = R::KIND, count, "Resources removed");
        }
        for resource in removed {
            record(R::KIND, "removed");
            self.notify(ResourceEvent::Removed(resource));
        }
        count
    }

    pub(crate) fn notify(&self, event: ResourceEvent<R>) {
        self.listeners.dispatch(R::KIND, &event);
    }

    /// Run `f` with exclusive access to the index
    ///
    /// Used by cascading stores to keep a multi-step mutation inside one
    /// lock acquisition. `f` must not call back into this store.
    pub(crate) fn with_index<T>(&self, f: impl FnOnce(&mut Index<R>) -> T) -> T {
        f(&mut self.inner.write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Tariff, TariffId};
    use crate::testing::{tariff, ts};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn cc(code: &str) -> CountryCode {
        CountryCode::new(code).unwrap()
    }

    fn pid(id: &str) -> PartyId {
        PartyId::new(id).unwrap()
    }

    fn tid(id: &str) -> TariffId {
        TariffId::new(id).unwrap()
    }

    fn recorder(store: &ResourceStore<Tariff>) -> Arc<Mutex<Vec<ResourceEvent<Tariff>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store.subscribe(move |event: &ResourceEvent<Tariff>| -> crate::notifications::ListenerResult {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        events
    }

    #[test]
    fn add_rejects_duplicates() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();

        let err = store.add(tariff("nl", "tnx", "t1", ts(20))).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists { kind: "Tariff", .. }));
        assert_eq!(store.get_all(Some(&cc("NL")), None).len(), 1);
    }

    #[test]
    fn add_if_not_exists_returns_stored_copy() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();
        let kept = store.add_if_not_exists(tariff("NL", "TNX", "T1", ts(20)));
        assert_eq!(kept.last_updated, ts(10));
    }

    #[test]
    fn add_or_update_requires_strictly_newer_timestamp() {
        let store = ResourceStore::new(false);
        let created = store.add_or_update(tariff("NL", "TNX", "T1", ts(10)), None).unwrap();
        assert!(created.was_created);

        let same = store.add_or_update(tariff("NL", "TNX", "T1", ts(10)), None);
        assert!(matches!(same, Err(DomainError::StaleUpdate { .. })));

        let older = store.add_or_update(tariff("NL", "TNX", "T1", ts(5)), None);
        assert!(matches!(older, Err(DomainError::StaleUpdate { .. })));

        let newer = store.add_or_update(tariff("NL", "TNX", "T1", ts(11)), None).unwrap();
        assert!(!newer.was_created);
    }

    #[test]
    fn concurrent_writers_keep_the_newest_timestamp() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(0))).unwrap();

        // Each writer pushes its timestamps newest first so arrival order
        // never matches timestamp order
        std::thread::scope(|scope| {
            for writer in 0..8i64 {
                let store = &store;
                scope.spawn(move || {
                    for step in (0..50i64).rev() {
                        let _ = store.add_or_update(tariff("NL", "TNX", "T1", ts(1 + step * 8 + writer)), None);
                    }
                });
            }
        });

        let stored = store.get(&cc("NL"), &pid("TNX"), &tid("T1")).unwrap();
        assert_eq!(stored.last_updated, ts(1 + 49 * 8 + 7));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn per_call_override_allows_downgrade() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();
        store.add_or_update(tariff("NL", "TNX", "T1", ts(1)), Some(true)).unwrap();
        assert_eq!(
            store.get(&cc("NL"), &pid("TNX"), &tid("T1")).unwrap().last_updated,
            ts(1)
        );

        let permissive = ResourceStore::new(true);
        permissive.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();
        permissive.add_or_update(tariff("NL", "TNX", "T1", ts(10)), None).unwrap();
        assert!(permissive.add_or_update(tariff("NL", "TNX", "T1", ts(9)), Some(false)).is_err());
    }

    #[test]
    fn try_patch_overlays_fields() {
        let store = ResourceStore::new(false);
        let original = store.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();

        let patched = store
            .try_patch(
                &original,
                &json!({ "currency": "USD", "last_updated": ts(20) }),
                None,
            )
            .unwrap();

        assert_eq!(patched.currency, "USD");
        assert_eq!(patched.elements, original.elements);
        assert_eq!(store.try_get(&cc("NL"), &pid("TNX"), &tid("T1")).unwrap(), patched);
    }

    #[test]
    fn try_patch_rejects_bad_patches() {
        let store = ResourceStore::new(false);
        let original = store.add(tariff("NL", "TNX", "T1", ts(10))).unwrap();

        assert!(matches!(
            store.try_patch(&original, &json!({}), None),
            Err(DomainError::InvalidPatch(_))
        ));
        assert!(matches!(
            store.try_patch(&original, &json!({ "id": "T2", "last_updated": ts(20) }), None),
            Err(DomainError::InvalidPatch(_))
        ));
        assert!(matches!(
            store.try_patch(&original, &json!({ "currency": "EUR", "last_updated": ts(10) }), None),
            Err(DomainError::StaleUpdate { .. })
        ));
        let missing = tariff("NL", "TNX", "NOPE", ts(1));
        assert!(matches!(
            store.try_patch(&missing, &json!({ "last_updated": ts(20) }), None),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn get_all_filters_by_country_and_party() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(1))).unwrap();
        store.add(tariff("NL", "ABC", "T2", ts(1))).unwrap();
        store.add(tariff("DE", "ABC", "T3", ts(1))).unwrap();

        assert_eq!(store.get_all(None, None).len(), 3);
        assert_eq!(store.get_all(Some(&cc("NL")), None).len(), 2);
        assert_eq!(store.get_all(None, Some(&pid("ABC"))).len(), 2);
        assert_eq!(store.get_all(Some(&cc("DE")), Some(&pid("ABC"))).len(), 1);
        assert!(store.get_all(Some(&cc("BE")), Some(&pid("ABC"))).is_empty());
        assert_eq!(store.get_all_matching(|t| t.id.as_str() != "T1").len(), 2);
    }

    #[test]
    fn removal_prunes_empty_party_nodes() {
        let store = ResourceStore::new(false);
        let t1 = store.add(tariff("NL", "TNX", "T1", ts(1))).unwrap();
        store.add(tariff("DE", "ABC", "T2", ts(1))).unwrap();
        store.add(tariff("DE", "ABC", "T3", ts(1))).unwrap();

        assert!(store.remove(&t1));
        assert!(!store.remove(&t1));
        assert_eq!(store.with_index(|index| index.len()), 1);

        assert_eq!(store.remove_all_for_party(&cc("DE"), &pid("ABC")), 2);
        assert_eq!(store.count(), 0);
        assert!(store.with_index(|index| index.is_empty()));
    }

    #[test]
    fn remove_all_with_filter() {
        let store = ResourceStore::new(false);
        store.add(tariff("NL", "TNX", "T1", ts(1))).unwrap();
        store.add(tariff("NL", "TNX", "T2", ts(1))).unwrap();
        store.add(tariff("DE", "ABC", "T3", ts(1))).unwrap();

        assert_eq!(store.remove_all(|t| t.country_code == cc("NL")), 2);
        assert_eq!(store.count(), 1);
        assert_eq!(store.with_index(|index| index.len()), 1);
    }

    #[test]
    fn listeners_see_every_mutation() {
        let store = ResourceStore::new(false);
        let events = recorder(&store);

        let t1 = store.add(tariff("NL", "TNX", "T1", ts(1))).unwrap();
        store.add_or_update(tariff("NL", "TNX", "T1", ts(2)), None).unwrap();
        let _ = store.add_or_update(tariff("NL", "TNX", "T1", ts(2)), None);
        store.remove(&t1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ResourceEvent::Added(_)));
        assert!(matches!(&events[1], ResourceEvent::Changed { previous, .. } if previous.last_updated == ts(1)));
        assert!(matches!(events[2], ResourceEvent::Removed(_)));
    }

    #[test]
    fn failing_listener_does_not_fail_mutation() {
        let store = ResourceStore::new(false);
        store.subscribe(|_: &ResourceEvent<Tariff>| -> crate::notifications::ListenerResult {
            panic!("listener bug")
        });
        assert!(store.add(tariff("NL", "TNX", "T1", ts(1))).is_ok());
        assert_eq!(store.count(), 1);
    }

    proptest! {
        #[test]
        fn accepts_update_iff_strictly_newer(first in 0i64..1_000, second in 0i64..1_000) {
            let store = ResourceStore::new(false);
            store.add(tariff("NL", "TNX", "T1", ts(first))).unwrap();
            let accepted = store.add_or_update(tariff("NL", "TNX", "T1", ts(second)), None).is_ok();
            prop_assert_eq!(accepted, second > first);
        }
    }
}
