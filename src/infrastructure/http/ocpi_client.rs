//! `reqwest` adapter for the outbound OCPI HTTP port

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, ClientBuilder, Method};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::ports::{HttpMethod, HttpReply, OcpiHttpClient, OcpiRequest, TransportError};
use crate::domain::AccessToken;

/// Value of the `Authorization` header for `token`
pub fn authorization_header(token: &AccessToken, base64_tokens: bool) -> String {
    if base64_tokens {
        format!("Token {}", BASE64.encode(token.as_str()))
    } else {
        format!("Token {}", token.as_str())
    }
}

/// Production HTTP client for calls to remote parties
pub struct ReqwestOcpiClient {
    client: Client,
    base64_tokens: bool,
}

impl ReqwestOcpiClient {
    pub fn new(connect_timeout: Duration, base64_tokens: bool) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            base64_tokens,
        })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl OcpiHttpClient for ReqwestOcpiClient {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: OcpiRequest) -> Result<HttpReply, TransportError> {
        let request_id = Uuid::new_v4().to_string();
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url)
            .timeout(request.timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                authorization_header(&request.token, self.base64_tokens),
            )
            .header("X-Request-ID", &request_id)
            .header("X-Correlation-ID", &request_id);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::InvalidBody(e.to_string())
            }
        })?;

        debug!(status, bytes = body.len(), request_id = %request_id, "Remote replied");
        if status >= 500 || status == 408 {
            return Err(TransportError::Status(status));
        }
        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_encodings() {
        let token = AccessToken::new("abc").unwrap();
        assert_eq!(authorization_header(&token, true), "Token YWJj");
        assert_eq!(authorization_header(&token, false), "Token abc");
    }
}
