//! Registration coordinator
//!
//! Server side: `GET/POST/PUT/DELETE {version}/credentials` for a caller
//! presenting a token. Client side: [`CredentialsService::register`] starts
//! the handshake towards a remote party we hold a bootstrap token for.
//!
//! Token naming follows the handshake: A is the bootstrap token issued out
//! of band, B is offered by the initiating party, C is the final token
//! minted by the answering party.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use crate::application::discovery::{DiscoveryOptions, VersionDiscoveryClient};
use crate::application::local_party::LocalParty;
use crate::application::ports::{OcpiHttpClient, OcpiRequest};
use crate::domain::ocpi::{Credentials, InterfaceRole, ModuleId, OcpiResponse};
use crate::domain::{
    AccessInfo, AccessStatus, AccessToken, DomainError, DomainResult, PartyStatus,
    RemoteAccessInfo, RemoteAccessStatus, RemoteParty, RemotePartyId, VersionId,
};
use crate::infrastructure::storage::RemoteParties;
use crate::notifications::{Event, PartyRegisteredEvent, SharedEventBus};

pub struct CredentialsService {
    local: Arc<LocalParty>,
    registry: Arc<RemoteParties>,
    http: Arc<dyn OcpiHttpClient>,
    options: DiscoveryOptions,
    events: Option<SharedEventBus>,
}

impl CredentialsService {
    pub fn new(
        local: Arc<LocalParty>,
        registry: Arc<RemoteParties>,
        http: Arc<dyn OcpiHttpClient>,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            local,
            registry,
            http,
            options,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn local(&self) -> &LocalParty {
        &self.local
    }

    /// Access info for `token`: unknown is 401, blocked or bound only to
    /// disabled parties is 403
    pub fn authorize(&self, token: &AccessToken) -> DomainResult<AccessInfo> {
        let parties = self.registry.get_remote_parties_by_token(token, None);
        if parties.is_empty() {
            return Err(DomainError::Unauthorized(format!(
                "unknown token #{}",
                token.fingerprint()
            )));
        }
        let mut allowed: Vec<AccessInfo> = parties
            .iter()
            .filter(|party| party.is_enabled())
            .filter_map(|party| party.access_info(token))
            .filter(|info| info.is_allowed())
            .cloned()
            .collect();
        // Prefer a binding that already completed registration
        allowed.sort_by_key(|info| !info.is_registered());
        allowed.into_iter().next().ok_or_else(|| {
            DomainError::Forbidden(format!("token #{} is blocked", token.fingerprint()))
        })
    }

    // ── Server side ────────────────────────────────────────────

    pub fn get(&self, token: &AccessToken) -> DomainResult<Credentials> {
        self.authorize(token)?;
        self.local.credentials(token.clone())
    }

    /// First registration; the presented token must not be registered yet
    pub async fn post(&self, token: &AccessToken, credentials: Credentials) -> DomainResult<Credentials> {
        let info = self.authorize(token)?;
        if info.is_registered() {
            return Err(DomainError::AlreadyRegistered(format!(
                "token #{} is already registered",
                token.fingerprint()
            )));
        }
        self.accept(token, false, credentials).await
    }

    /// Credentials update; the presented token must be registered
    pub async fn put(&self, token: &AccessToken, credentials: Credentials) -> DomainResult<Credentials> {
        let info = self.authorize(token)?;
        if !info.is_registered() {
            return Err(DomainError::NotRegistered(format!(
                "token #{} is not registered",
                token.fingerprint()
            )));
        }
        self.accept(token, true, credentials).await
    }

    /// Unregister: the token and entries bound only to it disappear
    pub fn delete(&self, token: &AccessToken) -> DomainResult<usize> {
        let info = self.authorize(token)?;
        if !info.is_registered() {
            return Err(DomainError::NotRegistered(format!(
                "token #{} is not registered",
                token.fingerprint()
            )));
        }
        Ok(self.registry.remove_access_token(token))
    }

    /// Answer a handshake initiated with `token_a`
    ///
    /// Discovery failures leave the registry untouched; the only mutation
    /// is the final rotation, which fails when `token_a` was consumed,
    /// blocked or removed while discovery was in flight.
    async fn accept(
        &self,
        token_a: &AccessToken,
        registered: bool,
        credentials: Credentials,
    ) -> DomainResult<Credentials> {
        credentials
            .validate()
            .map_err(|e| DomainError::InvalidRequest(e.to_string()))?;

        let discovery = VersionDiscoveryClient::new(
            self.http.clone(),
            credentials.url.clone(),
            credentials.token.clone(),
            self.options,
        );

        let versions = discovery.get_versions().await?;
        if !versions.iter().any(|v| v.version == self.local.version) {
            warn!(
                remote = %credentials.url,
                version = %self.local.version,
                "Remote party does not offer our version"
            );
            return Err(DomainError::UnsupportedVersion(format!(
                "{} does not list version {}",
                credentials.url, self.local.version
            )));
        }
        discovery.get_version_details(&self.local.version).await?;
        discovery.select_version(self.local.version.clone());

        let token_c = AccessToken::generate();
        let version_ids: Vec<VersionId> = versions.into_iter().map(|v| v.version).collect();
        let replacements: Vec<RemoteParty> = credentials
            .roles
            .iter()
            .map(|role| {
                let id = RemotePartyId::new(role.country_code.clone(), role.party_id.clone(), role.role);
                let remote_access = RemoteAccessInfo {
                    token: credentials.token.clone(),
                    versions_url: credentials.url.clone(),
                    version_ids: version_ids.clone(),
                    selected_version: Some(self.local.version.clone()),
                    status: RemoteAccessStatus::Online,
                    last_updated: Utc::now(),
                };
                RemoteParty::with_tokens(
                    id,
                    AccessInfo::registered(token_c.clone(), credentials.url.clone()),
                    remote_access,
                    PartyStatus::Enabled,
                )
                .business_details(role.business_details.clone())
            })
            .collect();

        if let Err(e) = self.registry.rotate_credentials(token_a, registered, replacements) {
            warn!(
                remote = %credentials.url,
                old_token = %token_a.fingerprint(),
                "Handshake token changed during discovery"
            );
            return Err(e);
        }
        info!(
            remote = %credentials.url,
            roles = credentials.roles.len(),
            old_token = %token_a.fingerprint(),
            new_token = %token_c.fingerprint(),
            "Remote party registered"
        );
        self.announce(&credentials);

        self.local.credentials(token_c)
    }

    // ── Client side ────────────────────────────────────────────

    /// Register with the remote party `id` using the bootstrap token we hold
    ///
    /// Mints token B, binds it so the remote's callbacks are accepted, POSTs
    /// our credentials and stores the token returned by the remote. Any
    /// failure after binding B removes it again.
    pub async fn register(&self, id: &RemotePartyId, version: Option<VersionId>) -> DomainResult<RemoteParty> {
        // Fail before any network call when our own identity is incomplete
        self.local.credentials(AccessToken::generate())?;

        let party = self.registry.get_remote_party(id)?;
        let remote = party
            .primary_remote_access()
            .cloned()
            .ok_or_else(|| DomainError::NoRemoteUrl(format!("{id} has no remote access info")))?;
        if remote.versions_url.is_empty() {
            return Err(DomainError::NoRemoteUrl(format!("{id} has no versions URL")));
        }
        let version = version
            .or_else(|| remote.selected_version.clone())
            .unwrap_or_else(|| self.local.version.clone());

        let discovery = VersionDiscoveryClient::new(
            self.http.clone(),
            remote.versions_url.clone(),
            remote.token.clone(),
            self.options,
        );
        let credentials_url = self.resolve_credentials_url(&discovery, &version).await?;

        let token_b = AccessToken::generate();
        self.registry.modify_remote_party(id, |party| {
            party
                .access_infos
                .push(AccessInfo::new(token_b.clone(), AccessStatus::Allowed));
        })?;

        match self.exchange(&credentials_url, &remote.token, &token_b).await {
            Ok(theirs) => {
                discovery.select_version(version.clone());
                let remote_access = RemoteAccessInfo {
                    token: theirs.token.clone(),
                    versions_url: theirs.url.clone(),
                    version_ids: discovery.cached_versions(),
                    selected_version: Some(version.clone()),
                    status: RemoteAccessStatus::Online,
                    last_updated: Utc::now(),
                };
                let registered = self.registry.modify_remote_party(id, |party| {
                    if let Some(info) = party.access_info_mut(&token_b) {
                        info.versions_url = Some(theirs.url.clone());
                    }
                    party.remote_access_infos = vec![remote_access];
                    if party.business_details.is_none() {
                        party.business_details = theirs
                            .roles
                            .iter()
                            .find(|role| role.role == id.role)
                            .map(|role| role.business_details.clone());
                    }
                })?;
                info!(
                    remote_party = %id,
                    version = %version,
                    token = %token_b.fingerprint(),
                    "Registered with remote party"
                );
                self.announce(&theirs);
                Ok(registered)
            }
            Err(e) => {
                warn!(remote_party = %id, error = %e, "Registration failed, rolling back token");
                let rollback = self.registry.modify_remote_party(id, |party| {
                    party.access_infos.retain(|info| info.token != token_b);
                });
                if let Err(rollback_error) = rollback {
                    warn!(remote_party = %id, error = %rollback_error, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn resolve_credentials_url(
        &self,
        discovery: &VersionDiscoveryClient,
        version: &VersionId,
    ) -> DomainResult<String> {
        let lookup = |role| discovery.get_remote_url(Some(version), ModuleId::Credentials, role);
        let resolved = match lookup(InterfaceRole::Receiver).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => lookup(InterfaceRole::Sender).await?,
            Err(DomainError::UnknownVersion(v)) => {
                return Err(DomainError::UnsupportedVersion(format!(
                    "{} does not list version {v}",
                    discovery.versions_url()
                )))
            }
            Err(e) => return Err(e),
        };
        resolved.ok_or_else(|| {
            DomainError::NoRemoteUrl(format!(
                "{} offers no credentials endpoint for {version}",
                discovery.versions_url()
            ))
        })
    }

    /// Single-shot credentials POST
    async fn exchange(
        &self,
        url: &str,
        token_a: &AccessToken,
        token_b: &AccessToken,
    ) -> DomainResult<Credentials> {
        let ours = self.local.credentials(token_b.clone())?;
        let body = serde_json::to_value(&ours)
            .map_err(|e| DomainError::InvalidRequest(e.to_string()))?;
        let request = OcpiRequest::post(url, token_a, body, self.options.request_timeout);

        let reply = self
            .http
            .send(request)
            .await
            .map_err(|e| DomainError::RemoteUnreachable(format!("{url}: {e}")))?;
        let envelope: OcpiResponse<Credentials> = reply
            .envelope()
            .map_err(|e| DomainError::RemoteUnreachable(format!("{url}: {e}")))?;
        match envelope.data {
            Some(theirs) if envelope.status_code.is_success() => Ok(theirs),
            _ => Err(DomainError::RemoteUnreachable(format!(
                "{url}: {}",
                envelope.describe()
            ))),
        }
    }

    fn announce(&self, credentials: &Credentials) {
        let Some(events) = &self.events else {
            return;
        };
        for role in &credentials.roles {
            events.publish(Event::PartyRegistered(PartyRegisteredEvent {
                party: format!("{}*{}", role.country_code, role.party_id),
                version: self.local.version.to_string(),
                roles: vec![role.role.to_string()],
            }));
        }
    }
}
