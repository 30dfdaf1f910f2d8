//! Case-insensitive identifier value types
//!
//! Every OCPI identifier is an immutable string compared without regard to
//! ASCII case. Equality, hashing and ordering all fold case the same way, so
//! the types are safe to use as `HashMap` and `BTreeMap` keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Identifier construction failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} exceeds {max} characters: {value}")]
    TooLong {
        kind: &'static str,
        max: usize,
        value: String,
    },
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

fn hash_ignore_case<H: Hasher>(value: &str, state: &mut H) {
    for b in value.bytes() {
        state.write_u8(b.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}

fn validate(kind: &'static str, max: usize, value: String) -> Result<String, IdentifierError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if value.chars().count() > max {
        return Err(IdentifierError::TooLong { kind, max, value });
    }
    Ok(value)
}

macro_rules! define_id {
    (@base $(#[$meta:meta])* $name:ident, $kind:literal, $max:expr) => {
        $(#[$meta])*
        #[derive(Clone, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Maximum length accepted by the protocol
            pub const MAX_LEN: usize = $max;

            pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
                validate($kind, $max, value.into()).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.eq_ignore_ascii_case(&other.0)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                hash_ignore_case(&self.0, state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                cmp_ignore_case(&self.0, &other.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
    (@secret $(#[$meta:meta])* $name:ident, $kind:literal, $max:expr) => {
        define_id!(@base $(#[$meta])* $name, $kind, $max);
    };
    ($(#[$meta:meta])* $name:ident, $kind:literal, $max:expr) => {
        define_id!(@base $(#[$meta])* $name, $kind, $max);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// ISO-3166 alpha-2 country code of a party
    CountryCode, "country code", 2
);
define_id!(
    /// ISO-15118 party id (three characters)
    PartyId, "party id", 3
);
define_id!(LocationId, "location id", 36);
define_id!(
    /// Stable EVSE identifier, used as the key of the EVSE set
    EvseUid, "EVSE uid", 36
);
define_id!(
    /// Public eMI3 EVSE identifier shown on the charger
    EvseId, "EVSE id", 48
);
define_id!(ConnectorId, "connector id", 36);
define_id!(TariffId, "tariff id", 36);
define_id!(SessionId, "session id", 36);
define_id!(TokenId, "token uid", 36);
define_id!(CdrId, "CDR id", 39);
define_id!(@secret
    /// Access token presented in the `Authorization` header
    AccessToken, "access token", 64
);

impl AccessToken {
    /// Mint a fresh random token (64 hex characters)
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(random_bytes))
    }

    /// Short SHA-256 fingerprint for logs and audit lines
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.to_ascii_lowercase().as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(#{})", self.fingerprint())
    }
}

/// OCPI protocol version identifier such as `2.2.1`
///
/// Ordered by numeric dot-separated components, so `2.2 < 2.2.1 < 2.10`.
/// Ties fall back to the case-insensitive text to stay consistent with `Eq`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionId(String);

impl VersionId {
    pub const MAX_LEN: usize = 16;

    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        validate("version", Self::MAX_LEN, value.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> Vec<u64> {
        self.0
            .split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect()
    }
}

impl PartialEq for VersionId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for VersionId {}

impl Hash for VersionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_ignore_case(&self.0, state);
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components()
            .cmp(&other.components())
            .then_with(|| cmp_ignore_case(&self.0, &other.0))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionId({})", self.0)
    }
}

impl FromStr for VersionId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VersionId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VersionId> for String {
    fn from(id: VersionId) -> String {
        id.0
    }
}

/// Owning (country code, party id) pair of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyKey {
    pub country_code: CountryCode,
    pub party_id: PartyId,
}

impl PartyKey {
    pub fn new(country_code: CountryCode, party_id: PartyId) -> Self {
        Self {
            country_code,
            party_id,
        }
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.country_code, self.party_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn comparison_ignores_case() {
        let a = CountryCode::new("de").unwrap();
        let b = CountryCode::new("DE").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn original_spelling_is_preserved() {
        let id = LocationId::new("Loc-1").unwrap();
        assert_eq!(id.as_str(), "Loc-1");
        assert_eq!(id.to_string(), "Loc-1");
    }

    #[test]
    fn rejects_blank_and_over_long_values() {
        assert_eq!(
            PartyId::new("  "),
            Err(IdentifierError::Empty { kind: "party id" })
        );
        assert!(matches!(
            PartyId::new("ABCD"),
            Err(IdentifierError::TooLong { max: 3, .. })
        ));
    }

    #[test]
    fn deserialization_validates() {
        let ok: CountryCode = serde_json::from_str("\"NL\"").unwrap();
        assert_eq!(ok.as_str(), "NL");
        assert!(serde_json::from_str::<CountryCode>("\"NLD\"").is_err());
        assert!(serde_json::from_str::<CountryCode>("\"\"").is_err());
    }

    #[test]
    fn versions_order_numerically() {
        let ordered: BTreeSet<VersionId> = ["2.10", "2.2.1", "2.1.1", "2.2"]
            .into_iter()
            .map(|v| VersionId::new(v).unwrap())
            .collect();
        let ordered: Vec<&str> = ordered.iter().map(VersionId::as_str).collect();
        assert_eq!(ordered, vec!["2.1.1", "2.2", "2.2.1", "2.10"]);
    }

    #[test]
    fn generated_tokens_are_unique_and_fingerprinted() {
        let a = AccessToken::generate();
        let b = AccessToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.fingerprint().len(), 16);
        assert!(!format!("{:?}", a).contains(a.as_str()));
    }

    #[test]
    fn fingerprint_is_case_insensitive() {
        let upper = AccessToken::new("TOKEN-A").unwrap();
        let lower = AccessToken::new("token-a").unwrap();
        assert_eq!(upper.fingerprint(), lower.fingerprint());
    }
}
