//! Version discovery documents

use serde::{Deserialize, Serialize};

use super::{InterfaceRole, ModuleId};
use crate::domain::VersionId;

/// Entry of the `/versions` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: VersionId,
    pub url: String,
}

/// Body of `/versions/{version}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetail {
    pub version: VersionId,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub identifier: ModuleId,
    pub role: InterfaceRole,
    pub url: String,
}

impl Endpoint {
    pub fn new(identifier: ModuleId, role: InterfaceRole, url: impl Into<String>) -> Self {
        Self {
            identifier,
            role,
            url: url.into(),
        }
    }

    pub fn matches(&self, module: ModuleId, role: InterfaceRole) -> bool {
        self.identifier == module && self.role == role
    }
}
