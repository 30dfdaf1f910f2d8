//! Remote party model
//!
//! A remote party is one (country code, party id, role) triple we exchange
//! data with. It carries the tokens it may present to us (`AccessInfo`) and
//! the tokens we present to it (`RemoteAccessInfo`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ocpi::{BusinessDetails, Role};
use crate::domain::{AccessToken, CountryCode, PartyId, PartyKey, VersionId};

/// Composite identifier of a remote party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemotePartyId {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub role: Role,
}

impl RemotePartyId {
    pub fn new(country_code: CountryCode, party_id: PartyId, role: Role) -> Self {
        Self {
            country_code,
            party_id,
            role,
        }
    }

    pub fn party_key(&self) -> PartyKey {
        PartyKey::new(self.country_code.clone(), self.party_id.clone())
    }

    pub fn belongs_to(&self, country_code: &CountryCode, party_id: &PartyId) -> bool {
        &self.country_code == country_code && &self.party_id == party_id
    }
}

impl fmt::Display for RemotePartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{} ({})", self.country_code, self.party_id, self.role)
    }
}

/// Status of a token a remote party presents to us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "ALLOWED"),
            Self::Blocked => write!(f, "BLOCKED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartyStatus {
    Enabled,
    Disabled,
}

impl fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "ENABLED"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Reachability of a remote party as last observed by us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteAccessStatus {
    Online,
    Offline,
    Error,
}

impl fmt::Display for RemoteAccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Inbound token binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub token: AccessToken,
    pub status: AccessStatus,
    /// Set once the party completed registration with this token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions_url: Option<String>,
    pub created: DateTime<Utc>,
}

impl AccessInfo {
    pub fn new(token: AccessToken, status: AccessStatus) -> Self {
        Self {
            token,
            status,
            versions_url: None,
            created: Utc::now(),
        }
    }

    pub fn registered(token: AccessToken, versions_url: impl Into<String>) -> Self {
        Self {
            versions_url: Some(versions_url.into()),
            ..Self::new(token, AccessStatus::Allowed)
        }
    }

    pub fn is_registered(&self) -> bool {
        self.versions_url.is_some()
    }

    pub fn is_allowed(&self) -> bool {
        self.status == AccessStatus::Allowed
    }
}

/// Outbound token binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccessInfo {
    pub token: AccessToken,
    pub versions_url: String,
    #[serde(default)]
    pub version_ids: Vec<VersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_version: Option<VersionId>,
    pub status: RemoteAccessStatus,
    pub last_updated: DateTime<Utc>,
}

impl RemoteAccessInfo {
    pub fn new(token: AccessToken, versions_url: impl Into<String>) -> Self {
        Self {
            token,
            versions_url: versions_url.into(),
            version_ids: Vec::new(),
            selected_version: None,
            status: RemoteAccessStatus::Offline,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParty {
    pub id: RemotePartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_details: Option<BusinessDetails>,
    #[serde(default)]
    pub access_infos: Vec<AccessInfo>,
    #[serde(default)]
    pub remote_access_infos: Vec<RemoteAccessInfo>,
    pub status: PartyStatus,
    pub last_updated: DateTime<Utc>,
}

impl RemoteParty {
    /// Restore a party from full binding lists
    pub fn new(
        id: RemotePartyId,
        access_infos: Vec<AccessInfo>,
        remote_access_infos: Vec<RemoteAccessInfo>,
        status: PartyStatus,
    ) -> Self {
        Self {
            id,
            business_details: None,
            access_infos,
            remote_access_infos,
            status,
            last_updated: Utc::now(),
        }
    }

    /// We issued them a token and hold one to call them
    pub fn with_tokens(
        id: RemotePartyId,
        access_info: AccessInfo,
        remote_access_info: RemoteAccessInfo,
        status: PartyStatus,
    ) -> Self {
        Self::new(id, vec![access_info], vec![remote_access_info], status)
    }

    /// We only issued them an inbound token
    pub fn with_access_token(id: RemotePartyId, access_info: AccessInfo, status: PartyStatus) -> Self {
        Self::new(id, vec![access_info], Vec::new(), status)
    }

    /// We only hold an outbound token to call them
    pub fn with_remote_access(
        id: RemotePartyId,
        remote_access_info: RemoteAccessInfo,
        status: PartyStatus,
    ) -> Self {
        Self::new(id, Vec::new(), vec![remote_access_info], status)
    }

    pub fn business_details(mut self, details: BusinessDetails) -> Self {
        self.business_details = Some(details);
        self
    }

    pub fn has_token(&self, token: &AccessToken) -> bool {
        self.access_infos.iter().any(|info| &info.token == token)
    }

    pub fn access_info(&self, token: &AccessToken) -> Option<&AccessInfo> {
        self.access_infos.iter().find(|info| &info.token == token)
    }

    pub fn access_info_mut(&mut self, token: &AccessToken) -> Option<&mut AccessInfo> {
        self.access_infos.iter_mut().find(|info| &info.token == token)
    }

    /// Copy with every binding of `token` filtered out
    pub fn without_token(&self, token: &AccessToken) -> Self {
        let mut copy = self.clone();
        copy.access_infos.retain(|info| &info.token != token);
        copy.last_updated = Utc::now();
        copy
    }

    pub fn primary_remote_access(&self) -> Option<&RemoteAccessInfo> {
        self.remote_access_infos.first()
    }

    pub fn is_enabled(&self) -> bool {
        self.status == PartyStatus::Enabled
    }
}
