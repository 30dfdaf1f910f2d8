//! Domain errors

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ocpi::StatusCode;

/// Domain-level error types
///
/// Expected conditions (stale updates, missing resources, failed handshakes)
/// are returned as values of this type; nothing in the core panics on them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Required argument missing: {0}")]
    NullArgument(&'static str),

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Stale update of {kind} {id}: {incoming} is not newer than {stored}")]
    StaleUpdate {
        kind: &'static str,
        id: String,
        stored: DateTime<Utc>,
        incoming: DateTime<Utc>,
    },

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("Not registered: {0}")]
    NotRegistered(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Remote party unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Could not fetch version details: {0}")]
    RemoteDetailFetchFailed(String),

    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("No remote URL: {0}")]
    NoRemoteUrl(String),
}

impl DomainError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    /// OCPI status code reported in the response body
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NullArgument(_) | Self::InvalidPatch(_) | Self::InvalidRequest(_) => {
                StatusCode::INVALID_OR_MISSING_PARAMETERS
            }
            Self::NotFound { .. } => StatusCode::UNKNOWN_RESOURCE,
            Self::AlreadyExists { .. }
            | Self::StaleUpdate { .. }
            | Self::NotRegistered(_)
            | Self::AlreadyRegistered(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::UnknownVersion(_) => StatusCode::CLIENT_ERROR,
            Self::RemoteUnreachable(_)
            | Self::RemoteDetailFetchFailed(_)
            | Self::NoRemoteUrl(_) => StatusCode::UNABLE_TO_USE_CLIENT_API,
            Self::UnsupportedVersion(_) => StatusCode::UNSUPPORTED_VERSION,
        }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_failures_use_3xxx_codes() {
        assert_eq!(
            DomainError::UnsupportedVersion("2.2.1".into()).status_code(),
            StatusCode(3003)
        );
        assert_eq!(
            DomainError::RemoteUnreachable("timeout".into()).status_code(),
            StatusCode(3001)
        );
    }

    #[test]
    fn client_errors_use_2xxx_codes() {
        assert_eq!(
            DomainError::AlreadyRegistered("token".into()).status_code(),
            StatusCode::CLIENT_ERROR
        );
        assert_eq!(
            DomainError::InvalidRequest("body".into()).status_code(),
            StatusCode(2001)
        );
        assert_eq!(
            DomainError::not_found("Location", "NL*TNX*1").to_string(),
            "Location not found: NL*TNX*1"
        );
    }
}
