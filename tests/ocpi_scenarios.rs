//! End-to-end scenarios between in-process OCPI nodes
//!
//! Every node gets the same [`Network`] as its outbound client; requests are
//! routed to the target node's axum router by URL prefix.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::Router;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tower::ServiceExt;

use texnouz_ocpi::application::ports::{
    HttpMethod, HttpReply, OcpiHttpClient, OcpiRequest, TransportError,
};
use texnouz_ocpi::config::AppConfig;
use texnouz_ocpi::domain::ocpi::Role;
use texnouz_ocpi::domain::{AccessToken, CountryCode, DomainError, PartyId, RemotePartyId};
use texnouz_ocpi::infrastructure::http::authorization_header;
use texnouz_ocpi::Node;

#[derive(Default)]
struct Network {
    hosts: RwLock<HashMap<String, Router>>,
}

impl Network {
    fn attach(&self, origin: &str, router: Router) {
        self.hosts.write().insert(origin.to_string(), router);
    }

    fn route(&self, url: &str) -> Option<(Router, String)> {
        self.hosts.read().iter().find_map(|(origin, router)| {
            url.strip_prefix(origin.as_str())
                .map(|path| (router.clone(), path.to_string()))
        })
    }
}

#[async_trait]
impl OcpiHttpClient for Network {
    async fn send(&self, request: OcpiRequest) -> Result<HttpReply, TransportError> {
        let (router, path) = self
            .route(&request.url)
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", request.url)))?;

        let builder = Request::builder()
            .method(request.method.to_string().as_str())
            .uri(path)
            .header("authorization", authorization_header(&request.token, true));
        let http_request = match request.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => builder.body(Body::empty()),
        }
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        let response = router
            .oneshot(http_request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let status = response.status().as_u16();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| TransportError::InvalidBody(e.to_string()))?;
        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

const CPO_ORIGIN: &str = "http://cpo.test";
const EMSP_ORIGIN: &str = "http://emsp.test";
const LEGACY_ORIGIN: &str = "http://legacy.test";

fn cpo_config() -> AppConfig {
    AppConfig::from_toml(
        r#"
        [server]
        public_url = "http://cpo.test/ocpi"

        [ocpi]
        [[ocpi.roles]]
        role = "CPO"
        country_code = "NL"
        party_id = "CPO"
        name = "Example CPO"

        [[ocpi.bootstrap]]
        country_code = "NL"
        party_id = "EMS"
        role = "EMSP"
        token = "token-a"
        "#,
    )
    .unwrap()
}

fn emsp_config() -> AppConfig {
    AppConfig::from_toml(
        r#"
        [server]
        public_url = "http://emsp.test/ocpi"

        [ocpi]
        [[ocpi.roles]]
        role = "EMSP"
        country_code = "NL"
        party_id = "EMS"
        name = "Example EMSP"

        [[ocpi.bootstrap]]
        country_code = "NL"
        party_id = "CPO"
        role = "CPO"
        token = "token-a"
        versions_url = "http://cpo.test/ocpi/versions"
        register_on_start = false
        "#,
    )
    .unwrap()
}

fn legacy_config() -> AppConfig {
    let mut config = emsp_config();
    config.server.public_url = Some("http://legacy.test/ocpi".into());
    config.ocpi.version = "2.1.1".into();
    config.ocpi.roles[0].party_id = "LEG".into();
    config.ocpi.bootstrap.clear();
    config
}

fn start(network: &Arc<Network>, origin: &str, config: AppConfig) -> Node {
    let node = Node::with_http(&config, network.clone()).unwrap();
    network.attach(origin, node.router(&config.server.base_path, None));
    node
}

fn party(cc: &str, pid: &str, role: Role) -> RemotePartyId {
    RemotePartyId::new(CountryCode::new(cc).unwrap(), PartyId::new(pid).unwrap(), role)
}

async fn call(network: &Network, method: HttpMethod, url: &str, token: &AccessToken, body: Option<Value>) -> (u16, Value) {
    let reply = network
        .send(OcpiRequest {
            method,
            url: url.to_string(),
            token: token.clone(),
            body,
            timeout: std::time::Duration::from_secs(5),
        })
        .await
        .unwrap();
    let json = serde_json::from_slice(&reply.body).unwrap_or(Value::Null);
    (reply.status, json)
}

fn location_body() -> Value {
    json!({
        "country_code": "NL",
        "party_id": "CPO",
        "id": "LOC1",
        "publish": true,
        "address": "Stationsplein 1",
        "city": "Amsterdam",
        "country": "NLD",
        "coordinates": { "latitude": "52.378", "longitude": "4.900" },
        "time_zone": "Europe/Amsterdam",
        "evses": [{
            "uid": "EVSE1",
            "status": "AVAILABLE",
            "connectors": [],
            "last_updated": "2024-01-01T00:00:10Z"
        }],
        "last_updated": "2024-01-01T00:00:10Z"
    })
}

#[tokio::test]
async fn handshake_binds_both_directions_and_retires_token_a() {
    let network = Arc::new(Network::default());
    let cpo = start(&network, CPO_ORIGIN, cpo_config());
    let emsp = start(&network, EMSP_ORIGIN, emsp_config());

    let registered = emsp
        .credentials
        .register(&party("NL", "CPO", Role::Cpo), None)
        .await
        .unwrap();
    let token_c = registered.primary_remote_access().unwrap().token.clone();
    assert_ne!(token_c.as_str(), "token-a");
    assert!(registered.access_infos.iter().all(|info| info.is_registered()));

    // CPO side: token A is gone, the EMSP is bound to C inbound and B outbound
    let token_a = AccessToken::new("token-a").unwrap();
    assert!(cpo.registry.get_access_infos(&token_a, None).is_empty());
    let emsp_party = cpo.registry.get_remote_party(&party("NL", "EMS", Role::Emsp)).unwrap();
    assert!(emsp_party.has_token(&token_c));
    let token_b = emsp_party.primary_remote_access().unwrap().token.clone();
    assert_eq!(emsp_party.primary_remote_access().unwrap().versions_url, "http://emsp.test/ocpi/versions");
    assert!(registered.has_token(&token_b));

    let (status, body) = call(&network, HttpMethod::Get, "http://cpo.test/ocpi/versions", &token_a, None).await;
    assert_eq!(status, 401);
    assert_eq!(body["status_code"], 2000);

    let (status, body) = call(&network, HttpMethod::Get, "http://cpo.test/ocpi/2.2.1/credentials", &token_c, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["roles"][0]["party_id"], "CPO");
}

#[tokio::test]
async fn registered_peers_exchange_module_data() {
    let network = Arc::new(Network::default());
    let cpo = start(&network, CPO_ORIGIN, cpo_config());
    let emsp = start(&network, EMSP_ORIGIN, emsp_config());
    let registered = emsp
        .credentials
        .register(&party("NL", "CPO", Role::Cpo), None)
        .await
        .unwrap();
    let token_c = registered.primary_remote_access().unwrap().token.clone();
    let token_b = cpo
        .registry
        .get_remote_party(&party("NL", "EMS", Role::Emsp))
        .unwrap()
        .primary_remote_access()
        .unwrap()
        .token
        .clone();

    // CPO pushes a location to the EMSP receiver with token B
    let url = "http://emsp.test/ocpi/2.2.1/emsp/locations/NL/CPO/LOC1";
    let (status, body) = call(&network, HttpMethod::Put, url, &token_b, Some(location_body())).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status_code"], 1000);

    let (status, body) = call(&network, HttpMethod::Get, &format!("{url}/EVSE1"), &token_b, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "AVAILABLE");

    // Replaying the same timestamp is not a silent overwrite
    let (status, body) = call(&network, HttpMethod::Put, url, &token_b, Some(location_body())).await;
    assert_eq!(status, 405);
    assert_eq!(body["status_code"], 2000);

    // EMSP pulls the CPO sender list with token C
    cpo.stores
        .locations
        .add_location(serde_json::from_value(location_body()).unwrap())
        .unwrap();
    let (status, body) = call(&network, HttpMethod::Get, "http://cpo.test/ocpi/2.2.1/cpo/locations", &token_c, None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], "LOC1");
}

#[tokio::test]
async fn remote_without_our_version_is_rejected_with_3003() {
    let network = Arc::new(Network::default());
    let cpo = start(&network, CPO_ORIGIN, cpo_config());
    let legacy = start(&network, LEGACY_ORIGIN, legacy_config());

    let token_b = AccessToken::new("legacy-token-b").unwrap();
    legacy
        .registry
        .add_remote_party(texnouz_ocpi::domain::RemoteParty::with_access_token(
            party("NL", "CPO", Role::Cpo),
            texnouz_ocpi::domain::AccessInfo::new(token_b.clone(), texnouz_ocpi::domain::AccessStatus::Allowed),
            texnouz_ocpi::domain::PartyStatus::Enabled,
        ))
        .unwrap();

    let credentials = json!({
        "token": token_b.as_str(),
        "url": "http://legacy.test/ocpi/versions",
        "roles": [{
            "role": "EMSP",
            "business_details": { "name": "Legacy EMSP" },
            "party_id": "EMS",
            "country_code": "NL"
        }]
    });
    let token_a = AccessToken::new("token-a").unwrap();
    let (status, body) = call(
        &network,
        HttpMethod::Post,
        "http://cpo.test/ocpi/2.2.1/credentials",
        &token_a,
        Some(credentials),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["status_code"], 3003);
    // Nothing changed: token A still valid, no party bound to token B
    assert_eq!(cpo.registry.get_access_infos(&token_a, None).len(), 1);
    assert!(cpo.registry.get_remote_parties_by_token(&token_b, None).is_empty());
}

#[tokio::test]
async fn client_registration_rolls_back_on_failure() {
    let network = Arc::new(Network::default());
    // No CPO attached: every outbound call fails to connect
    let emsp = start(&network, EMSP_ORIGIN, emsp_config());
    let id = party("NL", "CPO", Role::Cpo);

    let err = emsp.credentials.register(&id, None).await.unwrap_err();
    assert!(matches!(err, DomainError::RemoteUnreachable(_)), "{err:?}");

    let stored = emsp.registry.get_remote_party(&id).unwrap();
    assert!(stored.access_infos.is_empty());
    assert_eq!(stored.primary_remote_access().unwrap().token.as_str(), "token-a");
}

#[tokio::test]
async fn unregister_strips_the_token() {
    let network = Arc::new(Network::default());
    let cpo = start(&network, CPO_ORIGIN, cpo_config());
    let emsp = start(&network, EMSP_ORIGIN, emsp_config());
    let registered = emsp
        .credentials
        .register(&party("NL", "CPO", Role::Cpo), None)
        .await
        .unwrap();
    let token_c = registered.primary_remote_access().unwrap().token.clone();
    let credentials_url = "http://cpo.test/ocpi/2.2.1/credentials";

    let (status, _) = call(&network, HttpMethod::Delete, credentials_url, &token_c, None).await;
    assert_eq!(status, 200);
    assert!(cpo.registry.get_access_infos(&token_c, None).is_empty());
    assert!(!cpo.registry.contains_remote_party(&party("NL", "EMS", Role::Emsp)));

    let (status, _) = call(&network, HttpMethod::Delete, credentials_url, &token_c, None).await;
    assert_eq!(status, 401);
}
