//! Outbound HTTP adapters

pub mod ocpi_client;

pub use ocpi_client::{authorization_header, ReqwestOcpiClient};
