//! Credentials document exchanged during registration

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Role;
use crate::domain::{AccessToken, CountryCode, PartyId};

/// Business details of a party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl BusinessDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
        }
    }
}

/// One role a party registers under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRole {
    pub role: Role,
    pub business_details: BusinessDetails,
    pub party_id: PartyId,
    pub country_code: CountryCode,
}

/// `POST`/`PUT` body of the credentials module and its response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Credentials {
    pub token: AccessToken,
    /// Versions URL of the party sending these credentials
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub roles: Vec<CredentialsRole>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "token": "token-b",
            "url": "https://emsp.example.com/ocpi/versions",
            "roles": [{
                "role": "EMSP",
                "business_details": { "name": "Example EMSP" },
                "party_id": "EXA",
                "country_code": "NL"
            }]
        })
    }

    #[test]
    fn parses_protocol_document() {
        let credentials: Credentials = serde_json::from_value(sample()).unwrap();
        assert_eq!(credentials.roles.len(), 1);
        assert_eq!(credentials.roles[0].role, Role::Emsp);
        assert!(credentials.validate().is_ok());
    }

    #[test]
    fn rejects_missing_roles_and_bad_url() {
        let mut body = sample();
        body["roles"] = serde_json::json!([]);
        body["url"] = serde_json::json!("not a url");
        let credentials: Credentials = serde_json::from_value(body).unwrap();
        let errors = credentials.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("roles"));
        assert!(fields.contains_key("url"));
    }
}
