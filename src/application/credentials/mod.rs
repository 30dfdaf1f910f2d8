//! Credentials handshake, both as answering and as initiating party

mod service;

pub use service::CredentialsService;
