//! Locations module: our CPO sender list and the EMSP receiver with its
//! EVSE and Connector sub-resources

use axum::extract::State;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ocpi::Role;
use crate::domain::{
    Connector, ConnectorId, CountryCode, DomainError, DomainResult, Evse, EvseUid, Location,
    LocationId, OcpiResource, PartyId, VersionId,
};
use crate::interfaces::http::extract::{OcpiBody, OcpiPath, OptionalCaller, Registered};
use crate::interfaces::http::response::{OcpiJson, OcpiResult};
use crate::interfaces::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VersionPath {
    pub version: VersionId,
}

#[derive(Debug, Deserialize)]
pub struct OwnLocationPath {
    pub version: VersionId,
    pub location_id: LocationId,
}

#[derive(Debug, Deserialize)]
pub struct LocationPath {
    pub version: VersionId,
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub location_id: LocationId,
}

#[derive(Debug, Deserialize)]
pub struct EvsePath {
    pub version: VersionId,
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub location_id: LocationId,
    pub evse_uid: EvseUid,
}

#[derive(Debug, Deserialize)]
pub struct ConnectorPath {
    pub version: VersionId,
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub location_id: LocationId,
    pub evse_uid: EvseUid,
    pub connector_id: ConnectorId,
}

fn mismatch(field: &str, path: &dyn std::fmt::Display, body: &dyn std::fmt::Display) -> DomainError {
    DomainError::InvalidRequest(format!("{field} in body ({body}) differs from URL ({path})"))
}

/// Anonymous callers only see published locations; peers must be registered
fn visible(state: &AppState, caller: OptionalCaller) -> DomainResult<bool> {
    match caller.0 {
        Some(caller) => {
            caller.registered(&state.registry)?;
            Ok(true)
        }
        None if state.local.allow_open_data => Ok(false),
        None => Err(DomainError::Unauthorized("missing Authorization header".into())),
    }
}

// ── CPO sender ─────────────────────────────────────────────────

pub async fn list_own_locations(
    State(state): State<AppState>,
    caller: OptionalCaller,
    OcpiPath(path): OcpiPath<VersionPath>,
) -> OcpiResult<Vec<Location>> {
    state.check_version(&path.version)?;
    let include_unpublished = visible(&state, caller)?;
    let locations = state
        .own_parties(Role::Cpo)
        .iter()
        .flat_map(|key| {
            state
                .stores
                .locations
                .get_locations(Some(&key.country_code), Some(&key.party_id))
        })
        .filter(|location| include_unpublished || location.publish)
        .collect();
    Ok(OcpiJson::ok(locations))
}

pub async fn get_own_location(
    State(state): State<AppState>,
    caller: OptionalCaller,
    OcpiPath(path): OcpiPath<OwnLocationPath>,
) -> OcpiResult<Location> {
    state.check_version(&path.version)?;
    let include_unpublished = visible(&state, caller)?;
    state
        .own_parties(Role::Cpo)
        .iter()
        .find_map(|key| {
            state
                .stores
                .locations
                .try_get_location(&key.country_code, &key.party_id, &path.location_id)
        })
        .filter(|location| include_unpublished || location.publish)
        .map(OcpiJson::ok)
        .ok_or_else(|| DomainError::not_found("Location", &path.location_id))
}

// ── EMSP receiver ──────────────────────────────────────────────

fn stored_location(state: &AppState, caller: &Registered, path: &LocationPath) -> DomainResult<Location> {
    state.check_version(&path.version)?;
    caller.ensure_owns(&path.country_code, &path.party_id)?;
    state
        .stores
        .locations
        .get_location(&path.country_code, &path.party_id, &path.location_id)
}

impl EvsePath {
    fn location(&self) -> LocationPath {
        LocationPath {
            version: self.version.clone(),
            country_code: self.country_code.clone(),
            party_id: self.party_id.clone(),
            location_id: self.location_id.clone(),
        }
    }
}

impl ConnectorPath {
    fn evse(&self) -> EvsePath {
        EvsePath {
            version: self.version.clone(),
            country_code: self.country_code.clone(),
            party_id: self.party_id.clone(),
            location_id: self.location_id.clone(),
            evse_uid: self.evse_uid.clone(),
        }
    }
}

pub async fn get_location(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<LocationPath>,
) -> OcpiResult<Location> {
    Ok(OcpiJson::ok(stored_location(&state, &caller, &path)?))
}

pub async fn put_location(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<LocationPath>,
    OcpiBody(location): OcpiBody<Location>,
) -> OcpiResult<()> {
    state.check_version(&path.version)?;
    caller.ensure_owns(&path.country_code, &path.party_id)?;
    if location.country_code != path.country_code {
        return Err(mismatch("country_code", &path.country_code, &location.country_code));
    }
    if location.party_id != path.party_id {
        return Err(mismatch("party_id", &path.party_id, &location.party_id));
    }
    if location.id != path.location_id {
        return Err(mismatch("id", &path.location_id, &location.id));
    }
    state.stores.locations.add_or_update_location(location, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn patch_location(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<LocationPath>,
    OcpiBody(patch): OcpiBody<Value>,
) -> OcpiResult<()> {
    let existing = stored_location(&state, &caller, &path)?;
    state.stores.locations.try_patch_location(&existing, &patch, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn get_evse(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<EvsePath>,
) -> OcpiResult<Evse> {
    let location = stored_location(&state, &caller, &path.location())?;
    location
        .evse(&path.evse_uid)
        .cloned()
        .map(OcpiJson::ok)
        .ok_or_else(|| DomainError::not_found("EVSE", format!("{}*{}", location.display_key(), path.evse_uid)))
}

pub async fn put_evse(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<EvsePath>,
    OcpiBody(evse): OcpiBody<Evse>,
) -> OcpiResult<()> {
    let location = stored_location(&state, &caller, &path.location())?;
    if evse.uid != path.evse_uid {
        return Err(mismatch("uid", &path.evse_uid, &evse.uid));
    }
    state.stores.locations.add_or_update_evse(&location, evse, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn patch_evse(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<EvsePath>,
    OcpiBody(patch): OcpiBody<Value>,
) -> OcpiResult<()> {
    let location = stored_location(&state, &caller, &path.location())?;
    state
        .stores
        .locations
        .try_patch_evse(&location, &path.evse_uid, &patch, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn get_connector(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ConnectorPath>,
) -> OcpiResult<Connector> {
    let location = stored_location(&state, &caller, &path.evse().location())?;
    location
        .evse(&path.evse_uid)
        .and_then(|evse| evse.connector(&path.connector_id))
        .cloned()
        .map(OcpiJson::ok)
        .ok_or_else(|| {
            DomainError::not_found(
                "Connector",
                format!("{}*{}*{}", location.display_key(), path.evse_uid, path.connector_id),
            )
        })
}

pub async fn put_connector(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ConnectorPath>,
    OcpiBody(connector): OcpiBody<Connector>,
) -> OcpiResult<()> {
    let location = stored_location(&state, &caller, &path.evse().location())?;
    if connector.id != path.connector_id {
        return Err(mismatch("id", &path.connector_id, &connector.id));
    }
    state
        .stores
        .locations
        .add_or_update_connector(&location, &path.evse_uid, connector, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn patch_connector(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ConnectorPath>,
    OcpiBody(patch): OcpiBody<Value>,
) -> OcpiResult<()> {
    let location = stored_location(&state, &caller, &path.evse().location())?;
    state.stores.locations.try_patch_connector(
        &location,
        &path.evse_uid,
        &path.connector_id,
        &patch,
        None,
    )?;
    Ok(OcpiJson::accepted())
}
