//! Application ports (hexagonal architecture boundaries)
//!
//! Outbound contracts the core calls through: HTTP to remote parties and the
//! audit trail of registry mutations.

pub mod audit;
pub mod http;

pub use audit::{AuditAction, AuditRecord, AuditSink, NoopAuditSink};
pub use http::{HttpMethod, HttpReply, OcpiHttpClient, OcpiRequest, TransportError};
