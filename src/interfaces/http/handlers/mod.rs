//! OCPI request handlers, one module per protocol module

pub mod credentials;
pub mod health;
pub mod locations;
pub mod receivers;
pub mod versions;
