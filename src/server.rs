//! Node runtime: wiring of stores, registry, credentials service and the
//! HTTP server, plus tracing and metrics set-up.
//!
//! The binary calls [`init_tracing`] and then [`run`]; tests build a
//! [`Node`] directly and drive its router.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::ports::{AuditSink, NoopAuditSink, OcpiHttpClient, TransportError};
use crate::application::{CredentialsService, LocalParty};
use crate::config::{AppConfig, BootstrapConfig, ConfigError, LoggingConfig};
use crate::domain::{CountryCode, OcpiResource, PartyId, RemoteParty, RemotePartyId};
use crate::infrastructure::{
    ConnectorEvent, EvseEvent, FileAuditSink, OcpiStores, RegistryEvent, RemoteParties,
    ReqwestOcpiClient, ResourceEvent,
};
use crate::interfaces::http::{create_router, AppState};
use crate::notifications::{
    create_event_bus, ChangeAction, Event, EventSubscriber, EvseStatusChangedEvent,
    ListenerResult, RemotePartyChangedEvent, ResourceChangedEvent, SharedEventBus,
};
use crate::support::{ShutdownCoordinator, ShutdownSignal};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot open audit file: {0}")]
    Audit(#[source] std::io::Error),

    #[error("Cannot build HTTP client: {0}")]
    HttpClient(#[from] TransportError),

    #[error("Cannot install Prometheus recorder: {0}")]
    Metrics(String),

    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Install the global subscriber; `RUST_LOG` overrides `logging.level`
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// The global recorder can only be installed once per process
fn prometheus_handle() -> Result<PrometheusHandle, ServerError> {
    static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("Prometheus metrics recorder installed");
    Ok(PROM_HANDLE.get_or_init(|| handle).clone())
}

/// Every long-lived component of one OCPI node
pub struct Node {
    pub local: Arc<LocalParty>,
    pub registry: Arc<RemoteParties>,
    pub stores: Arc<OcpiStores>,
    pub credentials: Arc<CredentialsService>,
    pub event_bus: SharedEventBus,
}

impl Node {
    pub fn build(config: &AppConfig) -> Result<Self, ServerError> {
        let http = ReqwestOcpiClient::new(config.discovery_options().request_timeout, config.ocpi.base64_tokens)?;
        Self::with_http(config, Arc::new(http))
    }

    /// Build with a caller-supplied outbound client
    pub fn with_http(config: &AppConfig, http: Arc<dyn OcpiHttpClient>) -> Result<Self, ServerError> {
        config.validate()?;
        let local = Arc::new(config.local_party()?);

        let audit: Arc<dyn AuditSink> = match &config.logging.audit_file {
            Some(path) => {
                info!(path = %path.display(), "Writing registry audit trail");
                Arc::new(FileAuditSink::open(path).map_err(ServerError::Audit)?)
            }
            None => Arc::new(NoopAuditSink),
        };
        let registry = Arc::new(RemoteParties::new(audit));
        let stores = OcpiStores::shared(config.ocpi.allow_downgrades, config.ocpi.keep_removed_evses);

        let event_bus = create_event_bus();
        bridge_events(&stores, &registry, &event_bus);

        for party in bootstrap_parties(&config.ocpi.bootstrap)? {
            info!(
                remote_party = %party.id,
                inbound = party.access_infos.len(),
                outbound = party.remote_access_infos.len(),
                "Bootstrap token loaded"
            );
            registry.add_or_update_remote_party(party);
        }

        let credentials = Arc::new(
            CredentialsService::new(local.clone(), registry.clone(), http, config.discovery_options())
                .with_event_bus(event_bus.clone()),
        );

        Ok(Self {
            local,
            registry,
            stores,
            credentials,
            event_bus,
        })
    }

    pub fn router(&self, base_path: &str, metrics: Option<PrometheusHandle>) -> Router {
        let mut state = AppState::new(
            self.local.clone(),
            self.registry.clone(),
            self.stores.clone(),
            self.credentials.clone(),
        );
        if let Some(handle) = metrics {
            state = state.with_metrics(handle);
        }
        create_router(state, base_path)
    }

    /// Start the client-side handshake with every outbound bootstrap party
    pub fn register_outbound(&self, bootstrap: &[BootstrapConfig]) -> Result<(), ServerError> {
        for entry in bootstrap.iter().filter(|e| e.is_outbound() && e.register_on_start) {
            let id = entry.remote_party_id()?;
            let credentials = self.credentials.clone();
            tokio::spawn(async move {
                match credentials.register(&id, None).await {
                    Ok(party) => info!(remote_party = %party.id, "Registered with remote party"),
                    Err(e) => error!(remote_party = %id, error = %e, "Registration failed"),
                }
            });
        }
        Ok(())
    }
}

/// Bootstrap entries merged per remote party
fn bootstrap_parties(entries: &[BootstrapConfig]) -> Result<Vec<RemoteParty>, ConfigError> {
    let mut merged: BTreeMap<String, RemoteParty> = BTreeMap::new();
    for entry in entries {
        let party = entry.remote_party()?;
        match merged.get_mut(&party.id.to_string()) {
            Some(existing) => {
                existing.access_infos.extend(party.access_infos);
                existing.remote_access_infos.extend(party.remote_access_infos);
            }
            None => {
                merged.insert(party.id.to_string(), party);
            }
        }
    }
    Ok(merged.into_values().collect())
}

fn action_of<R>(event: &ResourceEvent<R>) -> ChangeAction {
    match event {
        ResourceEvent::Added(_) => ChangeAction::Added,
        ResourceEvent::Changed { .. } => ChangeAction::Changed,
        ResourceEvent::Removed(_) => ChangeAction::Removed,
    }
}

fn forward_resource<R: OcpiResource>(bus: SharedEventBus) -> impl Fn(&ResourceEvent<R>) -> ListenerResult + Send + Sync + 'static {
    move |event| {
        let resource = event.resource();
        bus.publish(Event::ResourceChanged(ResourceChangedEvent {
            kind: R::KIND.to_string(),
            party: resource.party_key().to_string(),
            id: resource.id().to_string(),
            action: action_of(event),
        }));
        Ok(())
    }
}

/// Forward store and registry notifications to the event bus
pub fn bridge_events(stores: &OcpiStores, registry: &RemoteParties, bus: &SharedEventBus) {
    stores.locations.subscribe(forward_resource(bus.clone()));
    stores.tariffs.subscribe(forward_resource(bus.clone()));
    stores.sessions.subscribe(forward_resource(bus.clone()));
    stores.tokens.subscribe(forward_resource(bus.clone()));
    stores.cdrs.subscribe(forward_resource(bus.clone()));

    let evse_bus = bus.clone();
    stores.locations.subscribe_evses(move |event: &EvseEvent| -> ListenerResult {
        let (key, location_id, uid, action) = match event {
            EvseEvent::StatusChanged {
                key,
                location_id,
                evse_uid,
                previous,
                current,
            } => {
                evse_bus.publish(Event::EvseStatusChanged(EvseStatusChangedEvent {
                    party: key.to_string(),
                    location_id: location_id.to_string(),
                    evse_uid: evse_uid.to_string(),
                    previous: *previous,
                    status: *current,
                }));
                return Ok(());
            }
            EvseEvent::Added { key, location_id, evse } => (key, location_id, &evse.uid, ChangeAction::Added),
            EvseEvent::Changed {
                key,
                location_id,
                current,
                ..
            } => (key, location_id, &current.uid, ChangeAction::Changed),
            EvseEvent::Removed { key, location_id, evse } => (key, location_id, &evse.uid, ChangeAction::Removed),
        };
        evse_bus.publish(Event::ResourceChanged(ResourceChangedEvent {
            kind: "EVSE".to_string(),
            party: key.to_string(),
            id: format!("{location_id}*{uid}"),
            action,
        }));
        Ok(())
    });

    let connector_bus = bus.clone();
    stores.locations.subscribe_connectors(move |event: &ConnectorEvent| -> ListenerResult {
        let (key, location_id, evse_uid, connector, action) = match event {
            ConnectorEvent::Added {
                key,
                location_id,
                evse_uid,
                connector,
            } => (key, location_id, evse_uid, connector, ChangeAction::Added),
            ConnectorEvent::Changed {
                key,
                location_id,
                evse_uid,
                current,
                ..
            } => (key, location_id, evse_uid, current, ChangeAction::Changed),
        };
        connector_bus.publish(Event::ResourceChanged(ResourceChangedEvent {
            kind: "Connector".to_string(),
            party: key.to_string(),
            id: format!("{location_id}*{evse_uid}*{}", connector.id),
            action,
        }));
        Ok(())
    });

    let registry_bus = bus.clone();
    registry.subscribe(move |event: &RegistryEvent| -> ListenerResult {
        let party = event.party();
        let action = match event {
            RegistryEvent::Added(_) => ChangeAction::Added,
            RegistryEvent::Updated { .. } => ChangeAction::Changed,
            RegistryEvent::Removed(_) => ChangeAction::Removed,
        };
        registry_bus.publish(Event::RemotePartyChanged(RemotePartyChangedEvent {
            party: party.id.party_key().to_string(),
            remote_party: party.id.to_string(),
            action,
        }));
        Ok(())
    });
}

/// Log every bus event until shutdown
fn spawn_event_logger(mut subscriber: EventSubscriber, shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                message = subscriber.recv() => match message {
                    Some(message) => debug!(
                        event_id = %message.id,
                        event_type = message.event.event_type(),
                        party = message.event.party(),
                        "Event"
                    ),
                    None => break,
                },
                _ = shutdown.wait() => break,
            }
        }
    });
}

/// Serve the node until SIGINT/SIGTERM
pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    let metrics = if config.metrics.enabled {
        Some(prometheus_handle()?)
    } else {
        None
    };

    let node = Node::build(&config)?;
    info!(
        versions_url = %node.local.versions_url(),
        version = %node.local.version,
        roles = node.local.roles.len(),
        "OCPI node initialised"
    );

    let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
    shutdown.start_signal_listener();
    let signal = shutdown.signal();
    spawn_event_logger(node.event_bus.subscribe(), signal.clone());

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, base_path = %config.server.base_path, "HTTP server listening");

    node.register_outbound(&config.ocpi.bootstrap)?;

    let router = node.router(&config.server.base_path, metrics);
    let serve_signal = signal.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        serve_signal.wait().await;
        info!("HTTP server received shutdown signal");
    });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Serve(e)),
                Err(e) => Err(ServerError::Serve(std::io::Error::other(e))),
            };
        }
        _ = signal.wait() => {}
    }

    let drained = shutdown
        .shutdown_with_cleanup(|| async move {
            match server_task.await {
                Ok(Ok(())) => info!("HTTP server stopped"),
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
            }
        })
        .await;
    if !drained {
        warn!("In-flight requests abandoned");
    }

    info!(remote_parties = node.registry.len(), "OCPI node shutdown complete");
    Ok(())
}

/// Resolve a remote party id given on the command line as `CC*PID*ROLE`
pub fn parse_remote_party_id(value: &str) -> Result<RemotePartyId, ConfigError> {
    let parts: Vec<&str> = value.split('*').collect();
    let [cc, pid, role] = parts.as_slice() else {
        return Err(ConfigError::Invalid(format!("expected CC*PID*ROLE, got {value}")));
    };
    let role = role
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{e}")))?;
    Ok(RemotePartyId::new(
        CountryCode::new(*cc)?,
        PartyId::new(*pid)?,
        role,
    ))
}
