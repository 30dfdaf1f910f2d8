//! Token entity and the token reference embedded in sessions and CDRs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CountryCode, OcpiResource, PartyId, TokenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    AdHocUser,
    AppUser,
    Other,
    Rfid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitelistType {
    Always,
    Allowed,
    AllowedOffline,
    Never,
}

/// How a charging session was authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    AuthRequest,
    Command,
    Whitelist,
}

/// Reference to the token that started a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrToken {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub uid: TokenId,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub contract_id: String,
}

/// Token issued by an eMSP to its customers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub uid: TokenId,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub contract_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_number: Option<String>,
    pub issuer: String,
    pub valid: bool,
    pub whitelist: WhitelistType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl OcpiResource for Token {
    type Id = TokenId;
    const KIND: &'static str = "Token";

    fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn id(&self) -> &TokenId {
        &self.uid
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}
