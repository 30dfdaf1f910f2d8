//! # Texnouz OCPI node
//!
//! OCPI 2.2.1 peering node: credentials handshake, version discovery and
//! multi-tenant stores for the locations, tariffs, sessions, tokens and cdrs
//! modules.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: OCPI resources, identifiers, remote parties and errors
//! - **application**: credentials handshake, version discovery and ports
//! - **infrastructure**: in-memory stores, party registry, reqwest client, audit file
//! - **interfaces**: axum HTTP layer
//! - **notifications**: store listeners and the process-wide event bus

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod notifications;
pub mod server;
pub mod support;

#[cfg(test)]
mod testing;

pub use config::{default_config_path, AppConfig};
pub use interfaces::http::create_router;
pub use notifications::{create_event_bus, Event, EventBus, SharedEventBus};
pub use server::{Node, ServerError};
