//! OCPI status codes (carried in the response body, not the HTTP status)

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: Self = Self(1000);

    /// Generic client error: bad or blocked token, not registered
    pub const CLIENT_ERROR: Self = Self(2000);
    pub const INVALID_OR_MISSING_PARAMETERS: Self = Self(2001);
    pub const NOT_ENOUGH_INFORMATION: Self = Self(2002);
    pub const UNKNOWN_RESOURCE: Self = Self(2003);

    pub const SERVER_ERROR: Self = Self(3000);
    /// The remote party's API could not be used during registration
    pub const UNABLE_TO_USE_CLIENT_API: Self = Self(3001);
    /// The remote party does not offer the version this node implements
    pub const UNSUPPORTED_VERSION: Self = Self(3003);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
