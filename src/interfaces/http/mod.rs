//! OCPI HTTP interface
//!
//! - `extract`: token authentication and OCPI-shaped path/body extractors
//! - `response`: envelope responses and the error mapping
//! - `handlers`: versions, credentials, locations and module receivers
//! - `router`: route table, CORS, tracing and metrics layers

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod state;

pub use response::{OcpiJson, OcpiResult};
pub use router::create_router;
pub use state::AppState;
