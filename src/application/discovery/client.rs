//! Version discovery client
//!
//! Fetches and caches a remote party's version list and per-version endpoint
//! lists, and resolves a (module, role) pair to a callable URL. The cache
//! mutex is only held between awaits, never across one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::application::ports::{OcpiHttpClient, OcpiRequest, TransportError};
use crate::domain::ocpi::{Endpoint, InterfaceRole, ModuleId, OcpiResponse, VersionDetail, VersionInfo};
use crate::domain::{AccessToken, DomainError, DomainResult, VersionId};
use crate::support::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Timeout of every outbound call
    pub request_timeout: Duration,
    /// Extra attempts of the versions call on transient failure
    pub max_retries: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Default)]
struct DiscoveryCache {
    versions: BTreeMap<VersionId, String>,
    details: BTreeMap<VersionId, Vec<Endpoint>>,
    selected: Option<VersionId>,
}

pub struct VersionDiscoveryClient {
    http: Arc<dyn OcpiHttpClient>,
    versions_url: String,
    token: AccessToken,
    options: DiscoveryOptions,
    cache: Mutex<DiscoveryCache>,
}

impl VersionDiscoveryClient {
    pub fn new(
        http: Arc<dyn OcpiHttpClient>,
        versions_url: impl Into<String>,
        token: AccessToken,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            http,
            versions_url: versions_url.into(),
            token,
            options,
            cache: Mutex::new(DiscoveryCache::default()),
        }
    }

    pub fn versions_url(&self) -> &str {
        &self.versions_url
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Fetch the version list and replace the cached one
    ///
    /// Transient failures (timeouts, HTTP 408 and 5xx) are retried
    /// immediately, up to `max_retries` extra attempts.
    #[instrument(skip(self), fields(url = %self.versions_url, token = %self.token.fingerprint()))]
    pub async fn get_versions(&self) -> DomainResult<Vec<VersionInfo>> {
        let request = OcpiRequest::get(&self.versions_url, &self.token, self.options.request_timeout);
        let http = self.http.clone();
        let reply = retry_with_backoff(
            RetryConfig::immediate(self.options.max_retries.saturating_add(1)),
            move || {
                let http = http.clone();
                let request = request.clone();
                async move { http.send(request).await }
            },
            TransportError::is_transient,
            "get_versions",
        )
        .await
        .map_err(|e| DomainError::RemoteUnreachable(format!("{}: {e}", self.versions_url)))?;

        let envelope: OcpiResponse<Vec<VersionInfo>> = reply
            .envelope()
            .map_err(|e| DomainError::RemoteUnreachable(format!("{}: {e}", self.versions_url)))?;
        if !envelope.is_success() {
            return Err(DomainError::RemoteUnreachable(format!(
                "{}: {}",
                self.versions_url,
                envelope.describe()
            )));
        }

        let versions = envelope.data.unwrap_or_default();
        self.cache.lock().versions = versions
            .iter()
            .map(|info| (info.version.clone(), info.url.clone()))
            .collect();
        debug!(count = versions.len(), "Cached remote versions");
        Ok(versions)
    }

    /// Fetch the endpoints of one cached version and replace its entry
    #[instrument(skip(self), fields(token = %self.token.fingerprint()))]
    pub async fn get_version_details(&self, version: &VersionId) -> DomainResult<Vec<Endpoint>> {
        let url = self
            .cache
            .lock()
            .versions
            .get(version)
            .cloned()
            .ok_or_else(|| DomainError::UnknownVersion(version.to_string()))?;

        let request = OcpiRequest::get(&url, &self.token, self.options.request_timeout);
        let reply = self
            .http
            .send(request)
            .await
            .map_err(|e| DomainError::RemoteDetailFetchFailed(format!("{url}: {e}")))?;
        let envelope: OcpiResponse<VersionDetail> = reply
            .envelope()
            .map_err(|e| DomainError::RemoteDetailFetchFailed(format!("{url}: {e}")))?;
        let detail = match envelope.data {
            Some(detail) if envelope.status_code.is_success() => detail,
            _ => {
                return Err(DomainError::RemoteDetailFetchFailed(format!(
                    "{url}: {}",
                    envelope.describe()
                )))
            }
        };

        self.cache
            .lock()
            .details
            .insert(version.clone(), detail.endpoints.clone());
        debug!(version = %version, endpoints = detail.endpoints.len(), "Cached version details");
        Ok(detail.endpoints)
    }

    /// URL of the first endpoint offering `module` in `role`
    ///
    /// The version is the explicit one, else the selected one, else the
    /// highest version with cached details, else the highest version the
    /// remote lists (fetched on demand).
    pub async fn get_remote_url(
        &self,
        version: Option<&VersionId>,
        module: ModuleId,
        role: InterfaceRole,
    ) -> DomainResult<Option<String>> {
        let resolved = {
            let cache = self.cache.lock();
            version
                .cloned()
                .or_else(|| cache.selected.clone())
                .or_else(|| cache.details.keys().next_back().cloned())
        };

        let version = match resolved {
            Some(version) => version,
            None => {
                self.get_versions().await?;
                match self.cache.lock().versions.keys().next_back().cloned() {
                    Some(highest) => highest,
                    None => return Ok(None),
                }
            }
        };

        let (has_details, knows_version) = {
            let cache = self.cache.lock();
            (cache.details.contains_key(&version), cache.versions.contains_key(&version))
        };
        if !has_details {
            if !knows_version {
                self.get_versions().await?;
            }
            self.get_version_details(&version).await?;
        }

        let cache = self.cache.lock();
        Ok(cache.details.get(&version).and_then(|endpoints| {
            endpoints
                .iter()
                .find(|endpoint| endpoint.matches(module, role))
                .map(|endpoint| endpoint.url.clone())
        }))
    }

    /// Highest version offered by both the remote (cached) and `ours`
    pub fn negotiate(&self, ours: &[VersionId]) -> Option<VersionId> {
        let cache = self.cache.lock();
        cache
            .versions
            .keys()
            .rev()
            .find(|version| ours.contains(version))
            .cloned()
    }

    pub fn select_version(&self, version: VersionId) {
        info!(version = %version, url = %self.versions_url, "Selected remote version");
        self.cache.lock().selected = Some(version);
    }

    pub fn selected_version(&self) -> Option<VersionId> {
        self.cache.lock().selected.clone()
    }

    pub fn cached_versions(&self) -> Vec<VersionId> {
        self.cache.lock().versions.keys().cloned().collect()
    }

    pub fn cached_endpoints(&self, version: &VersionId) -> Option<Vec<Endpoint>> {
        self.cache.lock().details.get(version).cloned()
    }
}
