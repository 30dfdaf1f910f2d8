//! Registry of remote parties and their token bindings

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::application::ports::{AuditAction, AuditRecord, AuditSink, NoopAuditSink};
use crate::domain::{
    AccessInfo, AccessStatus, AccessToken, CountryCode, DomainError, DomainResult, PartyId,
    RemoteAccessInfo, RemoteParty, RemotePartyId,
};
use crate::notifications::{Listener, Listeners};

const KIND: &str = "RemoteParty";

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Added(RemoteParty),
    Updated {
        previous: RemoteParty,
        current: RemoteParty,
    },
    Removed(RemoteParty),
}

impl RegistryEvent {
    pub fn party(&self) -> &RemoteParty {
        match self {
            Self::Added(p) | Self::Removed(p) => p,
            Self::Updated { current, .. } => current,
        }
    }

    fn audit_action(&self) -> AuditAction {
        match self {
            Self::Added(_) => AuditAction::Add,
            Self::Updated { .. } => AuditAction::Update,
            Self::Removed(_) => AuditAction::Remove,
        }
    }
}

type Index = BTreeMap<RemotePartyId, RemoteParty>;

/// Replace or insert `party`, returning the event describing the change
fn upsert(index: &mut Index, party: RemoteParty) -> RegistryEvent {
    match index.insert(party.id.clone(), party.clone()) {
        Some(previous) => RegistryEvent::Updated {
            previous,
            current: party,
        },
        None => RegistryEvent::Added(party),
    }
}

/// Strip `token` from every entry, deleting entries left without a binding
fn strip_token(index: &mut Index, token: &AccessToken) -> Vec<RegistryEvent> {
    let affected: Vec<RemotePartyId> = index
        .values()
        .filter(|party| party.has_token(token))
        .map(|party| party.id.clone())
        .collect();

    let mut changes = Vec::with_capacity(affected.len());
    for id in affected {
        let Some(party) = index.remove(&id) else {
            continue;
        };
        let remaining = party.without_token(token);
        if remaining.access_infos.is_empty() {
            changes.push(RegistryEvent::Removed(party));
        } else {
            index.insert(id, remaining.clone());
            changes.push(RegistryEvent::Updated {
                previous: party,
                current: remaining,
            });
        }
    }
    changes
}

pub struct RemoteParties {
    inner: RwLock<Index>,
    audit: Arc<dyn AuditSink>,
    listeners: Listeners<RegistryEvent>,
}

impl RemoteParties {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            audit,
            listeners: Listeners::new(),
        }
    }

    pub fn subscribe(&self, listener: impl Listener<RegistryEvent> + 'static) {
        self.listeners.subscribe(listener);
    }

    // ── Mutations ──────────────────────────────────────────────

    pub fn add_remote_party(&self, party: RemoteParty) -> DomainResult<RemoteParty> {
        {
            let mut index = self.inner.write();
            if index.contains_key(&party.id) {
                return Err(DomainError::already_exists(KIND, &party.id));
            }
            index.insert(party.id.clone(), party.clone());
        }
        self.publish(vec![RegistryEvent::Added(party.clone())]);
        Ok(party)
    }

    pub fn add_remote_party_if_not_exists(&self, party: RemoteParty) -> RemoteParty {
        {
            let mut index = self.inner.write();
            if let Some(existing) = index.get(&party.id) {
                return existing.clone();
            }
            index.insert(party.id.clone(), party.clone());
        }
        self.publish(vec![RegistryEvent::Added(party.clone())]);
        party
    }

    /// Whole-record replacement; returns true when newly created
    pub fn add_or_update_remote_party(&self, party: RemoteParty) -> bool {
        let event = upsert(&mut self.inner.write(), party);
        let created = matches!(event, RegistryEvent::Added(_));
        self.publish(vec![event]);
        created
    }

    /// Apply `change` to a copy of the stored entry and store the copy
    pub fn modify_remote_party(
        &self,
        id: &RemotePartyId,
        change: impl FnOnce(&mut RemoteParty),
    ) -> DomainResult<RemoteParty> {
        let event = {
            let mut index = self.inner.write();
            let mut party = index
                .get(id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(KIND, id))?;
            change(&mut party);
            party.last_updated = Utc::now();
            upsert(&mut index, party)
        };
        let party = event.party().clone();
        self.publish(vec![event]);
        Ok(party)
    }

    /// Replace the outbound binding after a successful client registration
    pub fn update_remote_access_info(
        &self,
        id: &RemotePartyId,
        remote_access: RemoteAccessInfo,
    ) -> DomainResult<RemoteParty> {
        self.modify_remote_party(id, |party| {
            party.remote_access_infos = vec![remote_access];
        })
    }

    /// Handshake commit: store `replacements` and retire `old_token`
    ///
    /// Both steps happen under one write lock so no reader ever observes
    /// token A and token C valid at the same time for the same party.
    /// The commit only happens while `old_token` is still bound ALLOWED to an
    /// enabled party with the given registration state; otherwise nothing
    /// changes and `NotRegistered` is returned.
    pub fn rotate_credentials(
        &self,
        old_token: &AccessToken,
        registered: bool,
        replacements: Vec<RemoteParty>,
    ) -> DomainResult<()> {
        let changes = {
            let mut index = self.inner.write();
            let still_bound = index
                .values()
                .filter(|party| party.is_enabled())
                .filter_map(|party| party.access_info(old_token))
                .any(|info| info.is_allowed() && info.is_registered() == registered);
            if !still_bound {
                return Err(DomainError::NotRegistered(format!(
                    "token #{} is no longer valid for this handshake",
                    old_token.fingerprint()
                )));
            }
            let mut changes = strip_token(&mut index, old_token);
            for party in replacements {
                changes.push(upsert(&mut index, party));
            }
            changes
        };
        info!(
            old_token = %old_token.fingerprint(),
            changes = changes.len(),
            "Credentials rotated"
        );
        self.publish(changes);
        Ok(())
    }

    pub fn remove_remote_party(&self, id: &RemotePartyId) -> bool {
        let removed = self.inner.write().remove(id);
        match removed {
            Some(party) => {
                self.publish(vec![RegistryEvent::Removed(party)]);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, party: &RemoteParty) -> bool {
        self.remove_remote_party(&party.id)
    }

    /// Remove every role of one party
    pub fn remove_remote_parties(&self, country_code: &CountryCode, party_id: &PartyId) -> usize {
        self.remove_matching(|party| party.id.belongs_to(country_code, party_id))
    }

    /// Remove the entry only if `token` is bound to it
    pub fn remove_remote_party_with_token(&self, id: &RemotePartyId, token: &AccessToken) -> bool {
        self.remove_matching(|party| &party.id == id && party.has_token(token)) > 0
    }

    /// Unbind `token` everywhere; returns the number of entries touched
    pub fn remove_access_token(&self, token: &AccessToken) -> usize {
        let changes = strip_token(&mut self.inner.write(), token);
        let count = changes.len();
        info!(token = %token.fingerprint(), entries = count, "Access token removed");
        self.publish(changes);
        count
    }

    fn remove_matching(&self, filter: impl Fn(&RemoteParty) -> bool) -> usize {
        let removed: Vec<RegistryEvent> = {
            let mut index = self.inner.write();
            let doomed: Vec<RemotePartyId> = index
                .values()
                .filter(|party| filter(party))
                .map(|party| party.id.clone())
                .collect();
            doomed
                .iter()
                .filter_map(|id| index.remove(id))
                .map(RegistryEvent::Removed)
                .collect()
        };
        let count = removed.len();
        self.publish(removed);
        count
    }

    // ── Lookups ────────────────────────────────────────────────

    pub fn contains_remote_party(&self, id: &RemotePartyId) -> bool {
        self.inner.read().contains_key(id)
    }

    pub fn try_get_remote_party(&self, id: &RemotePartyId) -> Option<RemoteParty> {
        self.inner.read().get(id).cloned()
    }

    pub fn get_remote_party(&self, id: &RemotePartyId) -> DomainResult<RemoteParty> {
        self.try_get_remote_party(id)
            .ok_or_else(|| DomainError::not_found(KIND, id))
    }

    pub fn all_remote_parties(&self) -> Vec<RemoteParty> {
        self.inner.read().values().cloned().collect()
    }

    pub fn get_remote_parties(&self, country_code: &CountryCode, party_id: &PartyId) -> Vec<RemoteParty> {
        self.inner
            .read()
            .values()
            .filter(|party| party.id.belongs_to(country_code, party_id))
            .cloned()
            .collect()
    }

    /// Entries `token` is bound to, optionally only with the given status
    pub fn get_remote_parties_by_token(
        &self,
        token: &AccessToken,
        status: Option<AccessStatus>,
    ) -> Vec<RemoteParty> {
        self.inner
            .read()
            .values()
            .filter(|party| {
                party
                    .access_info(token)
                    .is_some_and(|info| status.map_or(true, |s| info.status == s))
            })
            .cloned()
            .collect()
    }

    pub fn get_access_infos(&self, token: &AccessToken, status: Option<AccessStatus>) -> Vec<AccessInfo> {
        self.inner
            .read()
            .values()
            .flat_map(|party| party.access_infos.iter())
            .filter(|info| &info.token == token && status.map_or(true, |s| info.status == s))
            .cloned()
            .collect()
    }

    pub fn try_get_access_info(&self, token: &AccessToken) -> Option<AccessInfo> {
        self.get_access_infos(token, None).into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Audit and notify; always called with the lock released
    fn publish(&self, changes: Vec<RegistryEvent>) {
        for change in changes {
            let record = AuditRecord::new(change.audit_action(), change.party());
            if let Err(e) = self.audit.record(&record) {
                warn!(remote_party = %record.remote_party, error = %e, "Failed to write audit record");
            }
            debug!(remote_party = %record.remote_party, action = ?record.action, "Registry changed");
            self.listeners.dispatch(KIND, &change);
        }
    }
}

impl Default for RemoteParties {
    fn default() -> Self {
        Self::new(Arc::new(NoopAuditSink))
    }
}
