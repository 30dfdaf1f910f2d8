//! Party roles, modules and interface roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role a party plays in the OCPI network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Charge Point Operator
    Cpo,
    /// e-Mobility Service Provider
    Emsp,
    Hub,
    /// National Access Point
    Nap,
    /// Navigation Service Provider
    Nsp,
    Other,
    /// Smart Charging Service Provider
    Scsp,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpo => "CPO",
            Self::Emsp => "EMSP",
            Self::Hub => "HUB",
            Self::Nap => "NAP",
            Self::Nsp => "NSP",
            Self::Other => "OTHER",
            Self::Scsp => "SCSP",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPO" => Ok(Self::Cpo),
            "EMSP" => Ok(Self::Emsp),
            "HUB" => Ok(Self::Hub),
            "NAP" => Ok(Self::Nap),
            "NSP" => Ok(Self::Nsp),
            "OTHER" => Ok(Self::Other),
            "SCSP" => Ok(Self::Scsp),
            other => Err(format!("unknown role {other}")),
        }
    }
}

/// OCPI module identifiers as listed in version details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    Cdrs,
    ChargingProfiles,
    Commands,
    Credentials,
    HubClientInfo,
    Locations,
    Sessions,
    Tariffs,
    Tokens,
    /// Any module this node does not know about
    #[serde(other)]
    Unknown,
}

impl ModuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdrs => "cdrs",
            Self::ChargingProfiles => "chargingprofiles",
            Self::Commands => "commands",
            Self::Credentials => "credentials",
            Self::HubClientInfo => "hubclientinfo",
            Self::Locations => "locations",
            Self::Sessions => "sessions",
            Self::Tariffs => "tariffs",
            Self::Tokens => "tokens",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an endpoint exposes data (sender) or accepts it (receiver)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceRole {
    Sender,
    Receiver,
}

impl fmt::Display for InterfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender => f.write_str("SENDER"),
            Self::Receiver => f.write_str("RECEIVER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_modules_deserialize_to_unknown() {
        let module: ModuleId = serde_json::from_str("\"chargingprofiles\"").unwrap();
        assert_eq!(module, ModuleId::ChargingProfiles);
        let module: ModuleId = serde_json::from_str("\"bookings\"").unwrap();
        assert_eq!(module, ModuleId::Unknown);
    }

    #[test]
    fn roles_use_protocol_spelling() {
        assert_eq!(serde_json::to_string(&Role::Emsp).unwrap(), "\"EMSP\"");
        assert_eq!(Role::Cpo.to_string(), "CPO");
    }
}
