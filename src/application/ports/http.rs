//! Outbound HTTP port used to call remote OCPI parties
//!
//! [`OcpiHttpClient`] decouples discovery and registration from the concrete
//! transport. The production adapter is
//! [`ReqwestOcpiClient`](crate::infrastructure::http::ReqwestOcpiClient).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::domain::ocpi::OcpiResponse;
use crate::domain::AccessToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One authenticated request to a remote party
#[derive(Debug, Clone)]
pub struct OcpiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub token: AccessToken,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl OcpiRequest {
    pub fn get(url: impl Into<String>, token: &AccessToken, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            token: token.clone(),
            body: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, token: &AccessToken, body: Value, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(url, token, timeout)
        }
    }
}

/// Raw reply of a remote party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Parse the body as an OCPI envelope
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<OcpiResponse<T>, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

/// Transport-level failure of an outbound call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Remote answered HTTP {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    /// Timeouts, HTTP 408 and server errors are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Status(status) => *status == 408 || *status >= 500,
            Self::Connect(_) | Self::InvalidBody(_) => false,
        }
    }
}

#[async_trait]
pub trait OcpiHttpClient: Send + Sync {
    async fn send(&self, request: OcpiRequest) -> Result<HttpReply, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Status(503).is_transient());
        assert!(TransportError::Status(408).is_transient());
        assert!(!TransportError::Status(404).is_transient());
        assert!(!TransportError::Connect("refused".into()).is_transient());
    }

    #[test]
    fn envelope_parsing() {
        let reply = HttpReply {
            status: 200,
            body: br#"{"status_code":2000,"status_message":"nope"}"#.to_vec(),
        };
        let envelope: OcpiResponse<Value> = reply.envelope().unwrap();
        assert!(!envelope.is_success());
        assert_eq!(envelope.describe(), "status 2000 (nope)");
    }
}
