//! Charging session entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tariff::Price;
use crate::domain::token::{AuthMethod, CdrToken};
use crate::domain::{
    ConnectorId, CountryCode, EvseUid, LocationId, OcpiResource, PartyId, SessionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Invalid,
    Pending,
    Reservation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: SessionId,
    pub start_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<DateTime<Utc>>,
    pub kwh: Decimal,
    pub cdr_token: CdrToken,
    pub auth_method: AuthMethod,
    pub location_id: LocationId,
    pub evse_uid: EvseUid,
    pub connector_id: ConnectorId,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Price>,
    pub status: SessionStatus,
    pub last_updated: DateTime<Utc>,
}

impl OcpiResource for Session {
    type Id = SessionId;
    const KIND: &'static str = "Session";

    fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn id(&self) -> &SessionId {
        &self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}
