//! Shared state of the OCPI router

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::application::{CredentialsService, LocalParty};
use crate::domain::ocpi::Role;
use crate::domain::{DomainError, DomainResult, PartyKey, VersionId};
use crate::infrastructure::{OcpiStores, RemoteParties};

#[derive(Clone)]
pub struct AppState {
    pub local: Arc<LocalParty>,
    pub registry: Arc<RemoteParties>,
    pub stores: Arc<OcpiStores>,
    pub credentials: Arc<CredentialsService>,
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        local: Arc<LocalParty>,
        registry: Arc<RemoteParties>,
        stores: Arc<OcpiStores>,
        credentials: Arc<CredentialsService>,
    ) -> Self {
        Self {
            local,
            registry,
            stores,
            credentials,
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Reject path versions other than the one we serve
    pub fn check_version(&self, version: &VersionId) -> DomainResult<()> {
        if version == &self.local.version {
            Ok(())
        } else {
            Err(DomainError::UnknownVersion(version.to_string()))
        }
    }

    /// Party keys under which we publish data in `role`
    pub fn own_parties(&self, role: Role) -> Vec<PartyKey> {
        self.local
            .roles
            .iter()
            .filter(|r| r.role == role)
            .map(|r| PartyKey::new(r.country_code.clone(), r.party_id.clone()))
            .collect()
    }
}
