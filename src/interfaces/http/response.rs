//! OCPI envelope responses and the error-to-response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::ocpi::OcpiResponse;
use crate::domain::DomainError;

/// 200 response carrying an OCPI envelope
pub struct OcpiJson<T>(pub OcpiResponse<T>);

impl<T> OcpiJson<T> {
    pub fn ok(data: T) -> Self {
        Self(OcpiResponse::success(data))
    }
}

impl OcpiJson<()> {
    pub fn accepted() -> Self {
        Self(OcpiResponse::accepted())
    }
}

impl<T: Serialize> IntoResponse for OcpiJson<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.0)).into_response()
    }
}

/// Result type of every OCPI handler
pub type OcpiResult<T> = Result<OcpiJson<T>, DomainError>;

pub fn http_status(error: &DomainError) -> StatusCode {
    match error {
        DomainError::NullArgument(_)
        | DomainError::InvalidPatch(_)
        | DomainError::InvalidRequest(_)
        | DomainError::UnsupportedVersion(_) => StatusCode::BAD_REQUEST,
        DomainError::AlreadyExists { .. } => StatusCode::CONFLICT,
        DomainError::NotFound { .. } | DomainError::UnknownVersion(_) => StatusCode::NOT_FOUND,
        DomainError::StaleUpdate { .. }
        | DomainError::NotRegistered(_)
        | DomainError::AlreadyRegistered(_) => StatusCode::METHOD_NOT_ALLOWED,
        DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::RemoteUnreachable(_)
        | DomainError::RemoteDetailFetchFailed(_)
        | DomainError::NoRemoteUrl(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = http_status(&self);
        let code = self.status_code();
        if status.is_server_error() {
            warn!(http_status = status.as_u16(), ocpi_status = code.0, error = %self, "OCPI request failed");
        } else {
            debug!(http_status = status.as_u16(), ocpi_status = code.0, error = %self, "OCPI request rejected");
        }
        (status, Json(OcpiResponse::<()>::error(code, self.to_string()))).into_response()
    }
}
