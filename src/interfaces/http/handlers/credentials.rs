//! `{version}/credentials`

use axum::extract::State;
use tracing::info;

use crate::domain::ocpi::Credentials;
use crate::domain::VersionId;
use crate::interfaces::http::extract::{OcpiBody, OcpiPath, PresentedToken};
use crate::interfaces::http::response::{OcpiJson, OcpiResult};
use crate::interfaces::http::state::AppState;

pub async fn get_credentials(
    State(state): State<AppState>,
    OcpiPath(version): OcpiPath<VersionId>,
    PresentedToken(token): PresentedToken,
) -> OcpiResult<Credentials> {
    state.check_version(&version)?;
    Ok(OcpiJson::ok(state.credentials.get(&token)?))
}

pub async fn post_credentials(
    State(state): State<AppState>,
    OcpiPath(version): OcpiPath<VersionId>,
    PresentedToken(token): PresentedToken,
    OcpiBody(body): OcpiBody<Credentials>,
) -> OcpiResult<Credentials> {
    state.check_version(&version)?;
    info!(token = %token.fingerprint(), remote = %body.url, "Credentials POST");
    Ok(OcpiJson::ok(state.credentials.post(&token, body).await?))
}

pub async fn put_credentials(
    State(state): State<AppState>,
    OcpiPath(version): OcpiPath<VersionId>,
    PresentedToken(token): PresentedToken,
    OcpiBody(body): OcpiBody<Credentials>,
) -> OcpiResult<Credentials> {
    state.check_version(&version)?;
    info!(token = %token.fingerprint(), remote = %body.url, "Credentials PUT");
    Ok(OcpiJson::ok(state.credentials.put(&token, body).await?))
}

pub async fn delete_credentials(
    State(state): State<AppState>,
    OcpiPath(version): OcpiPath<VersionId>,
    PresentedToken(token): PresentedToken,
) -> OcpiResult<()> {
    state.check_version(&version)?;
    let removed = state.credentials.delete(&token)?;
    info!(token = %token.fingerprint(), entries = removed, "Credentials deleted");
    Ok(OcpiJson::accepted())
}
