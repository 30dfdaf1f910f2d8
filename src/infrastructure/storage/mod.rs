//! In-memory stores for OCPI resources and remote parties

mod location_store;
pub mod patch;
mod remote_parties;
mod resource_store;

use std::sync::Arc;

pub use location_store::{ConnectorEvent, EvseEvent, KeepRemovedEvse, LocationStore};
pub use remote_parties::{RegistryEvent, RemoteParties};
pub use resource_store::{AddOrUpdateResult, ResourceEvent, ResourceStore};

use crate::domain::{Cdr, Session, Tariff, Token};

pub type TariffStore = ResourceStore<Tariff>;
pub type SessionStore = ResourceStore<Session>;
pub type TokenStore = ResourceStore<Token>;
pub type CdrStore = ResourceStore<Cdr>;

/// Every resource store of one node, constructed once at start-up
pub struct OcpiStores {
    pub locations: LocationStore,
    pub tariffs: TariffStore,
    pub sessions: SessionStore,
    pub tokens: TokenStore,
    pub cdrs: CdrStore,
}

impl OcpiStores {
    pub fn new(allow_downgrades: bool, keep_removed_evse: KeepRemovedEvse) -> Self {
        Self {
            locations: LocationStore::with_policy(allow_downgrades, keep_removed_evse),
            tariffs: TariffStore::new(allow_downgrades),
            sessions: SessionStore::new(allow_downgrades),
            tokens: TokenStore::new(allow_downgrades),
            cdrs: CdrStore::new(allow_downgrades),
        }
    }

    pub fn shared(allow_downgrades: bool, keep_removed_evses: bool) -> Arc<Self> {
        Arc::new(Self::new(
            allow_downgrades,
            Arc::new(move |_: &crate::domain::Evse| keep_removed_evses),
        ))
    }
}
