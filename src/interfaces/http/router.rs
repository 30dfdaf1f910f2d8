//! OCPI router

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{credentials, health, locations, receivers, versions};
use super::middleware::{http_metrics_middleware, request_id_middleware};
use super::state::AppState;
use crate::domain::{Cdr, Session, Tariff, Token};

fn ocpi_routes() -> Router<AppState> {
    Router::new()
        // Versions
        .route("/versions", get(versions::list_versions))
        .route("/versions/{version}", get(versions::version_details))
        // Credentials
        .route(
            "/{version}/credentials",
            get(credentials::get_credentials)
                .post(credentials::post_credentials)
                .put(credentials::put_credentials)
                .delete(credentials::delete_credentials),
        )
        // CPO interfaces
        .route("/{version}/cpo/locations", get(locations::list_own_locations))
        .route("/{version}/cpo/locations/{location_id}", get(locations::get_own_location))
        .route("/{version}/cpo/tariffs", get(receivers::list_own_tariffs))
        .route(
            "/{version}/cpo/tokens/{country_code}/{party_id}/{id}",
            get(receivers::get_resource::<Token>)
                .put(receivers::put_resource::<Token>)
                .patch(receivers::patch_resource::<Token>),
        )
        // EMSP interfaces
        .route(
            "/{version}/emsp/locations/{country_code}/{party_id}/{location_id}",
            get(locations::get_location)
                .put(locations::put_location)
                .patch(locations::patch_location),
        )
        .route(
            "/{version}/emsp/locations/{country_code}/{party_id}/{location_id}/{evse_uid}",
            get(locations::get_evse)
                .put(locations::put_evse)
                .patch(locations::patch_evse),
        )
        .route(
            "/{version}/emsp/locations/{country_code}/{party_id}/{location_id}/{evse_uid}/{connector_id}",
            get(locations::get_connector)
                .put(locations::put_connector)
                .patch(locations::patch_connector),
        )
        .route(
            "/{version}/emsp/tariffs/{country_code}/{party_id}/{id}",
            get(receivers::get_resource::<Tariff>)
                .put(receivers::put_resource::<Tariff>)
                .delete(receivers::delete_resource::<Tariff>),
        )
        .route(
            "/{version}/emsp/sessions/{country_code}/{party_id}/{id}",
            get(receivers::get_resource::<Session>)
                .put(receivers::put_resource::<Session>)
                .patch(receivers::patch_resource::<Session>),
        )
        .route("/{version}/emsp/cdrs", post(receivers::post_cdr))
        .route(
            "/{version}/emsp/cdrs/{country_code}/{party_id}/{id}",
            get(receivers::get_resource::<Cdr>),
        )
        .route("/{version}/emsp/tokens", get(receivers::list_own_tokens))
}

/// Build the application router
///
/// OCPI modules are mounted under `base_path`; `/health` and `/metrics`
/// stay at the root.
pub fn create_router(state: AppState, base_path: &str) -> Router {
    let base_path = base_path.trim_end_matches('/');
    let ocpi = if base_path.is_empty() {
        ocpi_routes()
    } else {
        Router::new().nest(base_path, ocpi_routes())
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::prometheus_metrics))
        .merge(ocpi)
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::application::{CredentialsService, DiscoveryOptions, LocalParty};
    use crate::domain::ocpi::{BusinessDetails, CredentialsRole, Role};
    use crate::domain::{
        AccessInfo, AccessStatus, AccessToken, CountryCode, EvseStatus, LocationId, PartyId,
        PartyStatus, RemoteParty, RemotePartyId, VersionId,
    };
    use crate::infrastructure::{OcpiStores, RemoteParties};
    use crate::testing::{evse, location, ok_json, ts, FakeHttp};

    const REMOTE_VERSIONS: &str = "https://cpo.example/ocpi/versions";
    const REMOTE_DETAILS: &str = "https://cpo.example/ocpi/versions/2.2.1";

    struct Node {
        app: Router,
        registry: Arc<RemoteParties>,
        stores: Arc<OcpiStores>,
        http: Arc<FakeHttp>,
    }

    fn node(allow_open_data: bool) -> Node {
        let local = Arc::new(LocalParty::new(
            VersionId::new("2.2.1").unwrap(),
            "http://localhost/ocpi",
            [Role::Cpo, Role::Emsp]
                .into_iter()
                .map(|role| CredentialsRole {
                    role,
                    business_details: BusinessDetails::new("Texnouz"),
                    party_id: PartyId::new("TNX").unwrap(),
                    country_code: CountryCode::new("UZ").unwrap(),
                })
                .collect(),
            allow_open_data,
        ));
        let registry = Arc::new(RemoteParties::default());
        let stores = OcpiStores::shared(false, false);
        let http = Arc::new(FakeHttp::new());
        let credentials = Arc::new(CredentialsService::new(
            local.clone(),
            registry.clone(),
            http.clone(),
            DiscoveryOptions {
                request_timeout: Duration::from_secs(1),
                max_retries: 0,
            },
        ));
        let state = AppState::new(local, registry.clone(), stores.clone(), credentials);
        Node {
            app: create_router(state, "/ocpi"),
            registry,
            stores,
            http,
        }
    }

    fn cpo_id() -> RemotePartyId {
        RemotePartyId::new(CountryCode::new("NL").unwrap(), PartyId::new("TNX").unwrap(), Role::Cpo)
    }

    fn bind(node: &Node, info: AccessInfo) {
        node.registry
            .add_remote_party(RemoteParty::with_access_token(cpo_id(), info, PartyStatus::Enabled))
            .unwrap();
    }

    fn registered(node: &Node, token: &str) {
        bind(node, AccessInfo::registered(AccessToken::new(token).unwrap(), REMOTE_VERSIONS));
    }

    fn auth(token: &str) -> String {
        format!("Token {}", BASE64.encode(token))
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", auth(token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn versions_require_token_unless_open_data() {
        let node = node(false);
        let (status, body) = call(&node.app, "GET", "/ocpi/versions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status_code"], 2000);

        let open = self::node(true);
        let (status, body) = call(&open.app, "GET", "/ocpi/versions/2.2.1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let endpoints = body["data"]["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0]["identifier"], "locations");
    }

    #[tokio::test]
    async fn version_details_for_peers() {
        let node = node(false);
        bind(&node, AccessInfo::new(AccessToken::new("token-a").unwrap(), AccessStatus::Allowed));

        let (status, body) = call(&node.app, "GET", "/ocpi/versions", Some("token-a"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["url"], "http://localhost/ocpi/versions/2.2.1");

        let (status, body) = call(&node.app, "GET", "/ocpi/versions/2.2.1", Some("token-a"), None).await;
        assert_eq!(status, StatusCode::OK);
        let endpoints = body["data"]["endpoints"].as_array().unwrap();
        assert!(endpoints.iter().any(|e| e["identifier"] == "credentials"));
        assert!(endpoints.iter().any(|e| e["identifier"] == "sessions"));

        let (status, body) = call(&node.app, "GET", "/ocpi/versions/2.1.1", Some("token-a"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 2000);
    }

    #[tokio::test]
    async fn blocked_and_unknown_tokens() {
        let node = node(false);
        bind(&node, AccessInfo::new(AccessToken::new("blocked").unwrap(), AccessStatus::Blocked));

        let (status, _) = call(&node.app, "GET", "/ocpi/2.2.1/credentials", Some("blocked"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = call(&node.app, "GET", "/ocpi/2.2.1/credentials", Some("nobody"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status_code"], 2000);
    }

    #[tokio::test]
    async fn credentials_post_completes_handshake() {
        let node = node(false);
        bind(&node, AccessInfo::new(AccessToken::new("token-a").unwrap(), AccessStatus::Allowed));
        node.http.push(
            REMOTE_VERSIONS,
            Ok(ok_json(json!([{ "version": "2.2.1", "url": REMOTE_DETAILS }]))),
        );
        node.http.push(
            REMOTE_DETAILS,
            Ok(ok_json(json!({ "version": "2.2.1", "endpoints": [] }))),
        );

        let body = json!({
            "token": "token-b",
            "url": REMOTE_VERSIONS,
            "roles": [{
                "role": "CPO",
                "business_details": { "name": "Example CPO" },
                "party_id": "TNX",
                "country_code": "NL"
            }]
        });
        let (status, response) = call(&node.app, "POST", "/ocpi/2.2.1/credentials", Some("token-a"), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["status_code"], 1000);
        let token_c = response["data"]["token"].as_str().unwrap().to_string();
        assert_ne!(token_c, "token-a");

        let (status, _) = call(&node.app, "GET", "/ocpi/2.2.1/credentials", Some("token-a"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(&node.app, "GET", "/ocpi/2.2.1/credentials", Some(&token_c), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["token"], token_c.as_str());
    }

    #[tokio::test]
    async fn malformed_credentials_body_is_2001() {
        let node = node(false);
        bind(&node, AccessInfo::new(AccessToken::new("token-a").unwrap(), AccessStatus::Allowed));
        let (status, body) = call(
            &node.app,
            "POST",
            "/ocpi/2.2.1/credentials",
            Some("token-a"),
            Some(json!({ "token": "b" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status_code"], 2001);
    }

    #[tokio::test]
    async fn emsp_location_receiver_enforces_downgrades() {
        let node = node(false);
        registered(&node, "token-c");
        let uri = "/ocpi/2.2.1/emsp/locations/NL/TNX/LOC1";

        let mut loc = location("LOC1", ts(10));
        loc.evses.push(evse("E1", ts(10)));
        let (status, _) = call(&node.app, "PUT", uri, Some("token-c"), Some(serde_json::to_value(&loc).unwrap())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&node.app, "PUT", uri, Some("token-c"), Some(serde_json::to_value(&loc).unwrap())).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let patch = json!({ "status": "CHARGING", "last_updated": ts(20) });
        let (status, _) = call(&node.app, "PATCH", &format!("{uri}/E1"), Some("token-c"), Some(patch)).await;
        assert_eq!(status, StatusCode::OK);

        let stored = node
            .stores
            .locations
            .try_get_evse(
                &CountryCode::new("NL").unwrap(),
                &PartyId::new("TNX").unwrap(),
                &LocationId::new("LOC1").unwrap(),
                &crate::domain::EvseUid::new("E1").unwrap(),
            )
            .unwrap();
        assert_eq!(stored.status, EvseStatus::Charging);

        let (status, body) = call(&node.app, "GET", &format!("{uri}/E1"), Some("token-c"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "CHARGING");
    }

    #[tokio::test]
    async fn receivers_reject_foreign_parties_and_unregistered_tokens() {
        let node = node(false);
        registered(&node, "token-c");

        let loc = location("LOC1", ts(10));
        let (status, _) = call(
            &node.app,
            "PUT",
            "/ocpi/2.2.1/emsp/locations/DE/XYZ/LOC1",
            Some("token-c"),
            Some(serde_json::to_value(&loc).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let other = self::node(false);
        bind(&other, AccessInfo::new(AccessToken::new("token-a").unwrap(), AccessStatus::Allowed));
        let (status, body) = call(&other.app, "GET", "/ocpi/2.2.1/emsp/locations/NL/TNX/LOC1", Some("token-a"), None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["status_code"], 2000);
    }

    #[tokio::test]
    async fn tariff_receiver_round_trip() {
        let node = node(false);
        registered(&node, "token-c");
        let uri = "/ocpi/2.2.1/emsp/tariffs/NL/TNX/T1";
        let tariff = crate::testing::tariff("NL", "TNX", "T1", ts(5));

        let (status, _) = call(&node.app, "PUT", uri, Some("token-c"), Some(serde_json::to_value(&tariff).unwrap())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&node.app, "GET", uri, Some("token-c"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "T1");

        let (status, _) = call(&node.app, "DELETE", uri, Some("token-c"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&node.app, "GET", uri, Some("token-c"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 2003);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let node = node(false);
        registered(&node, "token-c");
        let (status, body) = call(&node.app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remote_parties"], 1);
        assert_eq!(body["ocpi_version"], "2.2.1");
    }
}
