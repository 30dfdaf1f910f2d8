//! OCPI response envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StatusCode;

/// Envelope wrapping every OCPI response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcpiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl<T> OcpiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            status_code: StatusCode::SUCCESS,
            status_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Success without a body, as answered to PUT/PATCH/DELETE
    pub fn accepted() -> Self {
        Self {
            data: None,
            status_code: StatusCode::SUCCESS,
            status_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            status_code,
            status_message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Human-readable summary for error messages
    pub fn describe(&self) -> String {
        match &self.status_message {
            Some(message) => format!("status {} ({})", self.status_code, message),
            None => format!("status {}", self.status_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_omits_data() {
        let response = OcpiResponse::<()>::error(StatusCode::CLIENT_ERROR, "Unknown token");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status_code"], 2000);
        assert_eq!(json["status_message"], "Unknown token");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn missing_timestamp_is_tolerated() {
        let response: OcpiResponse<Vec<u32>> =
            serde_json::from_str(r#"{"status_code":1000,"data":[1,2]}"#).unwrap();
        assert!(response.is_success());
        assert_eq!(response.data, Some(vec![1, 2]));
    }
}
