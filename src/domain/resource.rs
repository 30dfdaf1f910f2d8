//! Common shape of every versioned OCPI resource

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CountryCode, IdentifierError, PartyId, PartyKey};

/// A resource owned by exactly one (country code, party id) pair and
/// versioned by its `last_updated` timestamp.
pub trait OcpiResource:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: Clone
        + Ord
        + Hash
        + fmt::Display
        + fmt::Debug
        + FromStr<Err = IdentifierError>
        + Send
        + Sync
        + 'static;

    /// Human-readable kind used in errors, logs and metrics
    const KIND: &'static str;

    fn country_code(&self) -> &CountryCode;
    fn party_id(&self) -> &PartyId;
    fn id(&self) -> &Self::Id;
    fn last_updated(&self) -> DateTime<Utc>;

    fn party_key(&self) -> PartyKey {
        PartyKey::new(self.country_code().clone(), self.party_id().clone())
    }

    /// `CC*PID*ID`, used in error messages
    fn display_key(&self) -> String {
        format!("{}*{}*{}", self.country_code(), self.party_id(), self.id())
    }
}
