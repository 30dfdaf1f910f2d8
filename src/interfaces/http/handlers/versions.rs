//! `GET /versions` and `GET /versions/{version}`

use axum::extract::State;

use crate::application::Audience;
use crate::domain::ocpi::{VersionDetail, VersionInfo};
use crate::domain::{DomainError, DomainResult, VersionId};
use crate::interfaces::http::extract::{OcpiPath, OptionalCaller};
use crate::interfaces::http::response::{OcpiJson, OcpiResult};
use crate::interfaces::http::state::AppState;

fn audience(caller: &OptionalCaller, state: &AppState) -> DomainResult<Audience> {
    match (&caller.0, state.local.allow_open_data) {
        (Some(_), _) => Ok(Audience::Peer),
        (None, true) => Ok(Audience::OpenData),
        (None, false) => Err(DomainError::Unauthorized("missing Authorization header".into())),
    }
}

pub async fn list_versions(
    State(state): State<AppState>,
    caller: OptionalCaller,
) -> OcpiResult<Vec<VersionInfo>> {
    audience(&caller, &state)?;
    Ok(OcpiJson::ok(state.local.versions()))
}

pub async fn version_details(
    State(state): State<AppState>,
    caller: OptionalCaller,
    OcpiPath(version): OcpiPath<VersionId>,
) -> OcpiResult<VersionDetail> {
    let audience = audience(&caller, &state)?;
    state.check_version(&version)?;
    Ok(OcpiJson::ok(VersionDetail {
        version,
        endpoints: state.local.endpoints(audience),
    }))
}
