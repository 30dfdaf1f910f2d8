//! Shared fixtures for unit tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::application::ports::{HttpReply, OcpiHttpClient, OcpiRequest, TransportError};
use crate::domain::location::{
    Connector, ConnectorFormat, ConnectorStandard, Evse, EvseStatus, GeoLocation, Location,
    PowerType,
};
use crate::domain::tariff::{PriceComponent, Tariff, TariffDimensionType, TariffElement};
use crate::domain::token::{Token, TokenType, WhitelistType};
use crate::domain::{ConnectorId, CountryCode, EvseUid, LocationId, PartyId, TariffId, TokenId};

/// Fixed instant `secs` seconds after 2024-01-01T00:00:00Z
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn connector(id: &str, last_updated: DateTime<Utc>) -> Connector {
    Connector {
        id: ConnectorId::new(id).unwrap(),
        standard: ConnectorStandard::Iec62196T2,
        format: ConnectorFormat::Socket,
        power_type: PowerType::Ac3Phase,
        max_voltage: 230,
        max_amperage: 32,
        max_electric_power: Some(22_000),
        tariff_ids: Vec::new(),
        last_updated,
    }
}

pub fn evse(uid: &str, last_updated: DateTime<Utc>) -> Evse {
    Evse {
        uid: EvseUid::new(uid).unwrap(),
        evse_id: None,
        status: EvseStatus::Available,
        floor_level: None,
        physical_reference: None,
        connectors: Vec::new(),
        last_updated,
    }
}

/// Location owned by NL*TNX
pub fn location(id: &str, last_updated: DateTime<Utc>) -> Location {
    Location {
        country_code: CountryCode::new("NL").unwrap(),
        party_id: PartyId::new("TNX").unwrap(),
        id: LocationId::new(id).unwrap(),
        publish: true,
        name: Some("Depot".into()),
        address: "Stationsplein 1".into(),
        city: "Amsterdam".into(),
        postal_code: Some("1012AB".into()),
        country: "NLD".into(),
        coordinates: GeoLocation {
            latitude: "52.378".into(),
            longitude: "4.900".into(),
        },
        time_zone: "Europe/Amsterdam".into(),
        operator: None,
        evses: Vec::new(),
        last_updated,
    }
}

pub fn tariff(cc: &str, pid: &str, id: &str, last_updated: DateTime<Utc>) -> Tariff {
    Tariff {
        country_code: CountryCode::new(cc).unwrap(),
        party_id: PartyId::new(pid).unwrap(),
        id: TariffId::new(id).unwrap(),
        currency: "EUR".into(),
        tariff_type: None,
        elements: vec![TariffElement {
            price_components: vec![PriceComponent {
                dimension: TariffDimensionType::Energy,
                price: Decimal::new(25, 2),
                vat: None,
                step_size: 1,
            }],
        }],
        start_date_time: None,
        end_date_time: None,
        last_updated,
    }
}

pub fn token(cc: &str, pid: &str, uid: &str, last_updated: DateTime<Utc>) -> Token {
    Token {
        country_code: CountryCode::new(cc).unwrap(),
        party_id: PartyId::new(pid).unwrap(),
        uid: TokenId::new(uid).unwrap(),
        token_type: TokenType::Rfid,
        contract_id: format!("{cc}-{pid}-C{uid}"),
        visual_number: None,
        issuer: "Example EMSP".into(),
        valid: true,
        whitelist: WhitelistType::Allowed,
        language: None,
        last_updated,
    }
}

/// Successful OCPI envelope around `data`
pub fn ok_json(data: Value) -> HttpReply {
    HttpReply {
        status: 200,
        body: serde_json::to_vec(&json!({
            "data": data,
            "status_code": 1000,
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap(),
    }
}

/// Scripted HTTP client
///
/// Replies are queued per URL and consumed in order; the last queued reply
/// for a URL repeats. Unknown URLs fail with a connection error.
#[derive(Default)]
pub struct FakeHttp {
    replies: Mutex<HashMap<String, VecDeque<Result<HttpReply, TransportError>>>>,
    requests: Mutex<Vec<OcpiRequest>>,
    yielding: bool,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend once before every reply so concurrent callers interleave
    pub fn yielding() -> Self {
        Self {
            yielding: true,
            ..Self::default()
        }
    }

    pub fn push(&self, url: &str, reply: Result<HttpReply, TransportError>) {
        self.replies
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<OcpiRequest> {
        self.requests.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl OcpiHttpClient for FakeHttp {
    async fn send(&self, request: OcpiRequest) -> Result<HttpReply, TransportError> {
        if self.yielding {
            tokio::task::yield_now().await;
        }
        let url = request.url.clone();
        self.requests.lock().push(request);

        let mut replies = self.replies.lock();
        match replies.get_mut(&url) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connect(url.clone()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Connect(url.clone()))),
            None => Err(TransportError::Connect(format!("no route to {url}"))),
        }
    }
}
