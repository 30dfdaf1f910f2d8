//! Location, EVSE and Connector entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ocpi::BusinessDetails;
use crate::domain::{
    ConnectorId, CountryCode, EvseId, EvseUid, LocationId, OcpiResource, PartyId, TariffId,
};

/// EVSE availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvseStatus {
    Available,
    Blocked,
    Charging,
    Inoperative,
    OutOfOrder,
    Planned,
    /// Soft-deleted; kept or pruned depending on store policy
    Removed,
    Reserved,
    Unknown,
}

impl Default for EvseStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorStandard {
    #[serde(rename = "CHADEMO")]
    Chademo,
    #[serde(rename = "DOMESTIC_F")]
    DomesticF,
    #[serde(rename = "IEC_62196_T1")]
    Iec62196T1,
    #[serde(rename = "IEC_62196_T1_COMBO")]
    Iec62196T1Combo,
    #[serde(rename = "IEC_62196_T2")]
    Iec62196T2,
    #[serde(rename = "IEC_62196_T2_COMBO")]
    Iec62196T2Combo,
    #[serde(rename = "TESLA_S")]
    TeslaS,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectorFormat {
    Socket,
    Cable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerType {
    #[serde(rename = "AC_1_PHASE")]
    Ac1Phase,
    #[serde(rename = "AC_3_PHASE")]
    Ac3Phase,
    Dc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub standard: ConnectorStandard,
    pub format: ConnectorFormat,
    pub power_type: PowerType,
    pub max_voltage: u32,
    pub max_amperage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_electric_power: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tariff_ids: Vec<TariffId>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evse {
    pub uid: EvseUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<EvseId>,
    pub status: EvseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_reference: Option<String>,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    pub last_updated: DateTime<Utc>,
}

impl Evse {
    pub fn connector(&self, id: &ConnectorId) -> Option<&Connector> {
        self.connectors.iter().find(|c| &c.id == id)
    }

    /// Insert or replace a connector, keeping the original position
    pub fn upsert_connector(&mut self, connector: Connector) -> Option<Connector> {
        match self.connectors.iter_mut().find(|c| c.id == connector.id) {
            Some(slot) => Some(std::mem::replace(slot, connector)),
            None => {
                self.connectors.push(connector);
                None
            }
        }
    }

    pub fn is_removed(&self) -> bool {
        self.status == EvseStatus::Removed
    }

    /// True when `other` differs from `self` only in status and timestamp
    pub fn is_status_transition_of(&self, other: &Evse) -> bool {
        let mut normalized = other.clone();
        normalized.status = self.status;
        normalized.last_updated = self.last_updated;
        &normalized == self && other.status != self.status
    }
}

/// A charging location and the EVSEs it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub id: LocationId,
    pub publish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
    pub coordinates: GeoLocation,
    pub time_zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<BusinessDetails>,
    #[serde(default)]
    pub evses: Vec<Evse>,
    pub last_updated: DateTime<Utc>,
}

impl Location {
    pub fn evse(&self, uid: &EvseUid) -> Option<&Evse> {
        self.evses.iter().find(|e| &e.uid == uid)
    }

    /// Insert or replace an EVSE, keeping the original position
    pub fn upsert_evse(&mut self, evse: Evse) -> Option<Evse> {
        match self.evses.iter_mut().find(|e| e.uid == evse.uid) {
            Some(slot) => Some(std::mem::replace(slot, evse)),
            None => {
                self.evses.push(evse);
                None
            }
        }
    }

    pub fn remove_evse(&mut self, uid: &EvseUid) -> Option<Evse> {
        let index = self.evses.iter().position(|e| &e.uid == uid)?;
        Some(self.evses.remove(index))
    }
}

impl OcpiResource for Location {
    type Id = LocationId;
    const KIND: &'static str = "Location";

    fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    fn party_id(&self) -> &PartyId {
        &self.party_id
    }

    fn id(&self) -> &LocationId {
        &self.id
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connector, evse, location, ts};

    #[test]
    fn upsert_evse_replaces_in_place() {
        let mut loc = location("L1", ts(10));
        loc.upsert_evse(evse("E1", ts(10)));
        loc.upsert_evse(evse("E2", ts(10)));

        let mut replacement = evse("E1", ts(20));
        replacement.status = EvseStatus::Charging;
        let previous = loc.upsert_evse(replacement).unwrap();

        assert_eq!(previous.status, EvseStatus::Available);
        assert_eq!(loc.evses[0].status, EvseStatus::Charging);
        assert_eq!(loc.evses.len(), 2);
    }

    #[test]
    fn status_transition_detection() {
        let before = evse("E1", ts(10));
        let mut after = before.clone();
        after.status = EvseStatus::Charging;
        after.last_updated = ts(20);
        assert!(before.is_status_transition_of(&after));

        after.floor_level = Some("-1".into());
        assert!(!before.is_status_transition_of(&after));
    }

    #[test]
    fn connectors_are_keyed_by_id() {
        let mut e = evse("E1", ts(10));
        e.upsert_connector(connector("1", ts(10)));
        e.upsert_connector(connector("2", ts(10)));
        e.upsert_connector(connector("1", ts(11)));
        assert_eq!(e.connectors.len(), 2);
        let id = ConnectorId::new("1").unwrap();
        assert_eq!(e.connector(&id).unwrap().last_updated, ts(11));
    }

    #[test]
    fn serializes_with_protocol_field_names() {
        let json = serde_json::to_value(location("L1", ts(10))).unwrap();
        assert_eq!(json["country_code"], "NL");
        assert_eq!(json["party_id"], "TNX");
        assert!(json["last_updated"].is_string());
        assert_eq!(
            serde_json::to_value(PowerType::Ac3Phase).unwrap(),
            "AC_3_PHASE"
        );
    }
}
