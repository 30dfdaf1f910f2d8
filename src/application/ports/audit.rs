//! Audit port: one record per remote-party registry mutation

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ocpi::Role;
use crate::domain::{AccessStatus, PartyStatus, RemoteAccessStatus, RemoteParty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Add,
    Update,
    Remove,
}

/// Inbound binding as written to the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditedAccess {
    pub token_fingerprint: String,
    pub status: AccessStatus,
    pub registered: bool,
}

/// Outbound binding as written to the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditedRemoteAccess {
    pub token_fingerprint: String,
    pub versions_url: String,
    pub selected_version: Option<String>,
    pub status: RemoteAccessStatus,
}

/// One audit line. Tokens only ever appear as fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub remote_party: String,
    pub country_code: String,
    pub party_id: String,
    pub role: Role,
    pub status: PartyStatus,
    pub access: Vec<AuditedAccess>,
    pub remote_access: Vec<AuditedRemoteAccess>,
}

impl AuditRecord {
    pub fn new(action: AuditAction, party: &RemoteParty) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            remote_party: party.id.to_string(),
            country_code: party.id.country_code.to_string(),
            party_id: party.id.party_id.to_string(),
            role: party.id.role,
            status: party.status,
            access: party
                .access_infos
                .iter()
                .map(|info| AuditedAccess {
                    token_fingerprint: info.token.fingerprint(),
                    status: info.status,
                    registered: info.is_registered(),
                })
                .collect(),
            remote_access: party
                .remote_access_infos
                .iter()
                .map(|info| AuditedRemoteAccess {
                    token_fingerprint: info.token.fingerprint(),
                    versions_url: info.versions_url.clone(),
                    selected_version: info.selected_version.as_ref().map(ToString::to_string),
                    status: info.status,
                })
                .collect(),
        }
    }
}

/// Destination of audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> std::io::Result<()>;
}

/// Sink that drops every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: &AuditRecord) -> std::io::Result<()> {
        Ok(())
    }
}
