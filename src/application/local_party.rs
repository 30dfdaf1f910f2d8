//! Identity and published endpoints of this node

use crate::domain::ocpi::{
    Credentials, CredentialsRole, Endpoint, InterfaceRole, ModuleId, Role, VersionInfo,
};
use crate::domain::{AccessToken, DomainError, DomainResult, VersionId};

/// Which endpoint list a caller is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Caller presented a known token
    Peer,
    /// Anonymous caller, open data only
    OpenData,
}

#[derive(Debug, Clone)]
pub struct LocalParty {
    /// Protocol version this node implements
    pub version: VersionId,
    /// Public URL of the OCPI root, without trailing slash
    pub base_url: String,
    pub roles: Vec<CredentialsRole>,
    pub allow_open_data: bool,
}

impl LocalParty {
    pub fn new(
        version: VersionId,
        base_url: impl Into<String>,
        roles: Vec<CredentialsRole>,
        allow_open_data: bool,
    ) -> Self {
        Self {
            version,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            roles,
            allow_open_data,
        }
    }

    pub fn versions_url(&self) -> String {
        format!("{}/versions", self.base_url)
    }

    pub fn version_details_url(&self) -> String {
        format!("{}/versions/{}", self.base_url, self.version)
    }

    pub fn versions(&self) -> Vec<VersionInfo> {
        vec![VersionInfo {
            version: self.version.clone(),
            url: self.version_details_url(),
        }]
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }

    /// Our credentials document, carrying `token` for the remote to use
    pub fn credentials(&self, token: AccessToken) -> DomainResult<Credentials> {
        if self.roles.is_empty() {
            return Err(DomainError::NullArgument("roles"));
        }
        if self.base_url.is_empty() {
            return Err(DomainError::NullArgument("versions_url"));
        }
        Ok(Credentials {
            token,
            url: self.versions_url(),
            roles: self.roles.clone(),
        })
    }

    fn endpoint(&self, module: ModuleId, role: InterfaceRole, path: &str) -> Endpoint {
        Endpoint::new(module, role, format!("{}/{}/{}", self.base_url, self.version, path))
    }

    /// Endpoint list of `/versions/{version}` for the given audience
    pub fn endpoints(&self, audience: Audience) -> Vec<Endpoint> {
        let cpo = self.has_role(Role::Cpo);
        let emsp = self.has_role(Role::Emsp);

        if audience == Audience::OpenData {
            return if cpo {
                vec![self.endpoint(ModuleId::Locations, InterfaceRole::Sender, "cpo/locations")]
            } else {
                Vec::new()
            };
        }

        let mut endpoints = vec![
            self.endpoint(ModuleId::Credentials, InterfaceRole::Sender, "credentials"),
            self.endpoint(ModuleId::Credentials, InterfaceRole::Receiver, "credentials"),
        ];
        if cpo {
            endpoints.extend([
                self.endpoint(ModuleId::Locations, InterfaceRole::Sender, "cpo/locations"),
                self.endpoint(ModuleId::Tariffs, InterfaceRole::Sender, "cpo/tariffs"),
                self.endpoint(ModuleId::Tokens, InterfaceRole::Receiver, "cpo/tokens"),
            ]);
        }
        if emsp {
            endpoints.extend([
                self.endpoint(ModuleId::Locations, InterfaceRole::Receiver, "emsp/locations"),
                self.endpoint(ModuleId::Tariffs, InterfaceRole::Receiver, "emsp/tariffs"),
                self.endpoint(ModuleId::Sessions, InterfaceRole::Receiver, "emsp/sessions"),
                self.endpoint(ModuleId::Cdrs, InterfaceRole::Receiver, "emsp/cdrs"),
                self.endpoint(ModuleId::Tokens, InterfaceRole::Sender, "emsp/tokens"),
            ]);
        }
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ocpi::BusinessDetails;
    use crate::domain::{CountryCode, PartyId};

    fn party(roles: &[Role]) -> LocalParty {
        LocalParty::new(
            VersionId::new("2.2.1").unwrap(),
            "https://node.example/ocpi/",
            roles
                .iter()
                .map(|role| CredentialsRole {
                    role: *role,
                    business_details: BusinessDetails::new("Texnouz"),
                    party_id: PartyId::new("TNX").unwrap(),
                    country_code: CountryCode::new("UZ").unwrap(),
                })
                .collect(),
            true,
        )
    }

    #[test]
    fn urls_are_derived_from_base() {
        let local = party(&[Role::Cpo]);
        assert_eq!(local.versions_url(), "https://node.example/ocpi/versions");
        assert_eq!(local.versions()[0].url, "https://node.example/ocpi/versions/2.2.1");
    }

    #[test]
    fn endpoints_depend_on_role_and_audience() {
        let cpo = party(&[Role::Cpo]);
        let peer = cpo.endpoints(Audience::Peer);
        assert!(peer.iter().any(|e| e.matches(ModuleId::Locations, InterfaceRole::Sender)));
        assert!(!peer.iter().any(|e| e.matches(ModuleId::Sessions, InterfaceRole::Receiver)));

        let open = cpo.endpoints(Audience::OpenData);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].url, "https://node.example/ocpi/2.2.1/cpo/locations");

        let emsp = party(&[Role::Emsp]);
        assert!(emsp.endpoints(Audience::OpenData).is_empty());
        assert!(emsp
            .endpoints(Audience::Peer)
            .iter()
            .any(|e| e.matches(ModuleId::Sessions, InterfaceRole::Receiver)));
    }

    #[test]
    fn credentials_require_roles() {
        let local = party(&[]);
        assert_eq!(
            local.credentials(AccessToken::generate()),
            Err(DomainError::NullArgument("roles"))
        );
    }
}
