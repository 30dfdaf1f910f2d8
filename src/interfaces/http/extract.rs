//! Request extractors: token authentication, typed path and JSON body
//!
//! Every rejection is a [`DomainError`], so failures leave the router as an
//! OCPI envelope instead of axum's plain-text bodies.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;

use super::state::AppState;
use crate::domain::{
    AccessInfo, AccessStatus, AccessToken, CountryCode, DomainError, DomainResult, PartyId,
    RemoteParty, RemotePartyId,
};
use crate::infrastructure::RemoteParties;

const TOKEN_SCHEME: &str = "Token ";

/// Candidate tokens of an `Authorization` value, decoded form first
fn candidates(value: &str) -> Vec<AccessToken> {
    let raw = value.trim();
    let decoded = BASE64
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| AccessToken::new(text).ok());
    decoded
        .into_iter()
        .chain(AccessToken::new(raw).ok())
        .collect()
}

/// Token presented in `headers`, if any
///
/// The first candidate known to the registry wins; when none is known the
/// first candidate is returned so the caller can reject it.
pub fn presented_token(headers: &HeaderMap, registry: &RemoteParties) -> DomainResult<Option<AccessToken>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| DomainError::Unauthorized("malformed Authorization header".into()))?;
    let credentials = value
        .strip_prefix(TOKEN_SCHEME)
        .ok_or_else(|| DomainError::Unauthorized("Authorization scheme must be Token".into()))?;

    let candidates = candidates(credentials);
    let known = candidates
        .iter()
        .find(|token| registry.try_get_access_info(token).is_some())
        .cloned();
    match known.or_else(|| candidates.into_iter().next()) {
        Some(token) => Ok(Some(token)),
        None => Err(DomainError::Unauthorized("empty token".into())),
    }
}

/// Token from the `Authorization` header, not yet checked against the registry
pub struct PresentedToken(pub AccessToken);

impl FromRequestParts<AppState> for PresentedToken {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        presented_token(&parts.headers, &state.registry)?
            .map(Self)
            .ok_or_else(|| DomainError::Unauthorized("missing Authorization header".into()))
    }
}

/// Caller holding an allowed token
#[derive(Debug, Clone)]
pub struct Caller {
    pub token: AccessToken,
    pub info: AccessInfo,
}

impl Caller {
    fn authorize(token: AccessToken, state: &AppState) -> DomainResult<Self> {
        let info = state.credentials.authorize(&token)?;
        Ok(Self { token, info })
    }

    /// Module endpoints need a completed registration
    pub fn registered(self, registry: &RemoteParties) -> DomainResult<Registered> {
        if !self.info.is_registered() {
            return Err(DomainError::NotRegistered(format!(
                "token #{} has not completed registration",
                self.token.fingerprint()
            )));
        }
        let parties = registry
            .get_remote_parties_by_token(&self.token, Some(AccessStatus::Allowed))
            .into_iter()
            .filter(RemoteParty::is_enabled)
            .map(|party| party.id)
            .collect();
        Ok(Registered {
            token: self.token,
            parties,
        })
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let PresentedToken(token) = PresentedToken::from_request_parts(parts, state).await?;
        Self::authorize(token, state)
    }
}

/// Caller that may be anonymous; a presented token must still be valid
pub struct OptionalCaller(pub Option<Caller>);

impl FromRequestParts<AppState> for OptionalCaller {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match presented_token(&parts.headers, &state.registry)? {
            Some(token) => Ok(Self(Some(Caller::authorize(token, state)?))),
            None => Ok(Self(None)),
        }
    }
}

/// Registered remote party and the entries its token is bound to
#[derive(Debug, Clone)]
pub struct Registered {
    pub token: AccessToken,
    pub parties: Vec<RemotePartyId>,
}

impl Registered {
    /// Receivers only accept data a party publishes under its own identity
    pub fn ensure_owns(&self, country_code: &CountryCode, party_id: &PartyId) -> DomainResult<()> {
        if self.parties.iter().any(|id| id.belongs_to(country_code, party_id)) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "token #{} may not publish for {country_code}*{party_id}",
                self.token.fingerprint()
            )))
        }
    }
}

impl FromRequestParts<AppState> for Registered {
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Caller::from_request_parts(parts, state)
            .await?
            .registered(&state.registry)
    }
}

/// `Path` whose rejection is an OCPI 2001
pub struct OcpiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for OcpiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| DomainError::InvalidRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// JSON body whose rejection is an OCPI 2001
pub struct OcpiBody<T>(pub T);

impl<S, T> FromRequest<S> for OcpiBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = DomainError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| DomainError::InvalidRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}
