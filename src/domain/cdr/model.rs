//! Charge detail record entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::location::{ConnectorFormat, ConnectorStandard, GeoLocation, PowerType};
use crate::domain::tariff::Price;
use crate::domain::token::{AuthMethod, CdrToken};
use crate::domain::{
    CdrId, ConnectorId, CountryCode, EvseId, EvseUid, LocationId, OcpiResource, PartyId,
    SessionId,
};

/// Snapshot of the location a CDR was produced at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdrLocation {
    pub id: LocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    pub city: String,
    pub country: String,
    pub coordinates: GeoLocation,
    pub evse_uid: EvseUid,
    pub evse_id: EvseId,
    pub connector_id: ConnectorId,
    pub connector_standard: ConnectorStandard,
    pub connector_format: ConnectorFormat,
    pub connector_power_type: PowerType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cdr {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: CdrId,
    pub start_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub cdr_token: CdrToken,
    pub auth_method: AuthMethod,
    pub cdr_location: CdrLocation,
    pub currency: String,
    pub total_cost: Price,
    /// kWh
    pub total_energy: Decimal,
    /// Hours
    pub total_time: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl OcpiResource for Cdr {
    type Id = CdrId;
    const KIND: &'static str = "CDR";

    fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn id(&self) -> &CdrId {
        &self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}
