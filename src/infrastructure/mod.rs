//! Infrastructure layer - external concerns

pub mod audit;
pub mod http;
pub mod storage;

pub use audit::FileAuditSink;
pub use http::ReqwestOcpiClient;
pub use storage::{
    ConnectorEvent, EvseEvent, LocationStore, OcpiStores, RegistryEvent, RemoteParties,
    ResourceEvent, ResourceStore,
};
