//! Receiver and sender interfaces of the tariffs, sessions, tokens and cdrs
//! modules, generic over the stored resource

use axum::extract::State;
use axum::http::header::LOCATION;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::domain::ocpi::Role;
use crate::domain::{
    Cdr, CountryCode, DomainError, DomainResult, OcpiResource, PartyId, Session, Tariff, Token,
    VersionId,
};
use crate::infrastructure::{OcpiStores, ResourceStore};
use crate::interfaces::http::extract::{OcpiBody, OcpiPath, Registered};
use crate::interfaces::http::handlers::locations::VersionPath;
use crate::interfaces::http::response::{OcpiJson, OcpiResult};
use crate::interfaces::http::state::AppState;

/// Resource kinds served through the generic handlers
pub trait ModuleResource: OcpiResource {
    fn store(stores: &OcpiStores) -> &ResourceStore<Self>;
}

impl ModuleResource for Tariff {
    fn store(stores: &OcpiStores) -> &ResourceStore<Self> {
        &stores.tariffs
    }
}

impl ModuleResource for Session {
    fn store(stores: &OcpiStores) -> &ResourceStore<Self> {
        &stores.sessions
    }
}

impl ModuleResource for Token {
    fn store(stores: &OcpiStores) -> &ResourceStore<Self> {
        &stores.tokens
    }
}

impl ModuleResource for Cdr {
    fn store(stores: &OcpiStores) -> &ResourceStore<Self> {
        &stores.cdrs
    }
}

#[derive(Debug, Deserialize)]
pub struct ResourcePath {
    pub version: VersionId,
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: String,
}

impl ResourcePath {
    fn id<R: OcpiResource>(&self) -> DomainResult<R::Id> {
        self.id
            .parse()
            .map_err(|e| DomainError::InvalidRequest(format!("{} id: {e}", R::KIND)))
    }

    /// Version, ownership and id checks shared by every receiver call
    fn resolve<R: OcpiResource>(&self, state: &AppState, caller: &Registered) -> DomainResult<R::Id> {
        state.check_version(&self.version)?;
        caller.ensure_owns(&self.country_code, &self.party_id)?;
        self.id::<R>()
    }
}

fn ensure_matches<R: OcpiResource>(path: &ResourcePath, id: &R::Id, resource: &R) -> DomainResult<()> {
    if resource.country_code() != &path.country_code
        || resource.party_id() != &path.party_id
        || resource.id() != id
    {
        return Err(DomainError::InvalidRequest(format!(
            "{} {} in body differs from URL {}*{}*{}",
            R::KIND,
            resource.display_key(),
            path.country_code,
            path.party_id,
            path.id
        )));
    }
    Ok(())
}

pub async fn get_resource<R: ModuleResource>(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ResourcePath>,
) -> OcpiResult<R> {
    let id = path.resolve::<R>(&state, &caller)?;
    let resource = R::store(&state.stores).get(&path.country_code, &path.party_id, &id)?;
    Ok(OcpiJson::ok(resource))
}

pub async fn put_resource<R: ModuleResource>(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ResourcePath>,
    OcpiBody(resource): OcpiBody<R>,
) -> OcpiResult<()> {
    let id = path.resolve::<R>(&state, &caller)?;
    ensure_matches(&path, &id, &resource)?;
    R::store(&state.stores).add_or_update(resource, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn patch_resource<R: ModuleResource>(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ResourcePath>,
    OcpiBody(patch): OcpiBody<Value>,
) -> OcpiResult<()> {
    let id = path.resolve::<R>(&state, &caller)?;
    let store = R::store(&state.stores);
    let existing = store.get(&path.country_code, &path.party_id, &id)?;
    store.try_patch(&existing, &patch, None)?;
    Ok(OcpiJson::accepted())
}

pub async fn delete_resource<R: ModuleResource>(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<ResourcePath>,
) -> OcpiResult<()> {
    let id = path.resolve::<R>(&state, &caller)?;
    R::store(&state.stores)
        .remove_by_id(&path.country_code, &path.party_id, &id)
        .ok_or_else(|| {
            DomainError::not_found(R::KIND, format!("{}*{}*{}", path.country_code, path.party_id, id))
        })?;
    Ok(OcpiJson::accepted())
}

/// `POST {version}/emsp/cdrs`: CDRs are immutable, a second POST is a conflict
pub async fn post_cdr(
    State(state): State<AppState>,
    caller: Registered,
    OcpiPath(path): OcpiPath<VersionPath>,
    OcpiBody(cdr): OcpiBody<Cdr>,
) -> Result<Response, DomainError> {
    state.check_version(&path.version)?;
    caller.ensure_owns(&cdr.country_code, &cdr.party_id)?;
    let location = format!(
        "{}/{}/emsp/cdrs/{}/{}/{}",
        state.local.base_url, path.version, cdr.country_code, cdr.party_id, cdr.id
    );
    let stored = state.stores.cdrs.add(cdr)?;
    info!(cdr = %stored.display_key(), "CDR received");

    let mut response = OcpiJson::accepted().into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(LOCATION, value);
    }
    Ok(response)
}

/// Sender list of the data we publish ourselves in `role`
fn own_resources<R: ModuleResource>(state: &AppState, role: Role) -> Vec<R> {
    state
        .own_parties(role)
        .iter()
        .flat_map(|key| R::store(&state.stores).get_all(Some(&key.country_code), Some(&key.party_id)))
        .collect()
}

pub async fn list_own_tariffs(
    State(state): State<AppState>,
    _caller: Registered,
    OcpiPath(path): OcpiPath<VersionPath>,
) -> OcpiResult<Vec<Tariff>> {
    state.check_version(&path.version)?;
    Ok(OcpiJson::ok(own_resources(&state, Role::Cpo)))
}

pub async fn list_own_tokens(
    State(state): State<AppState>,
    _caller: Registered,
    OcpiPath(path): OcpiPath<VersionPath>,
) -> OcpiResult<Vec<Token>> {
    state.check_version(&path.version)?;
    Ok(OcpiJson::ok(own_resources(&state, Role::Emsp)))
}
