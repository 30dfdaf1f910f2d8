//! Configuration module
//!
//! Loaded from TOML (`~/.config/texnouz-ocpi/config.toml` by default). A
//! missing file yields [`AppConfig::default`]; every section and field is
//! optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::{DiscoveryOptions, LocalParty};
use crate::domain::ocpi::{BusinessDetails, CredentialsRole, Role};
use crate::domain::{
    AccessInfo, AccessStatus, AccessToken, CountryCode, IdentifierError, PartyId, PartyStatus,
    RemoteAccessInfo, RemoteParty, RemotePartyId, VersionId,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid identifier in configuration: {0}")]
    Identifier(#[from] IdentifierError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ocpi: OcpiConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the OCPI modules
    pub base_path: String,
    /// Externally reachable URL of `base_path`, advertised to remote parties
    pub public_url: Option<String>,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
            base_path: "/ocpi".to_string(),
            public_url: None,
            shutdown_timeout: 30,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}{}", self.host, self.port, self.base_path.trim_end_matches('/')),
        }
    }
}

/// One role this node plays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role: Role,
    pub country_code: String,
    pub party_id: String,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}

/// Token exchanged out of band before the credentials handshake
///
/// Without `versions_url` this is a token A we issued, accepted on our
/// credentials endpoint. With `versions_url` it is a token A the remote
/// issued to us, used to register with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub country_code: String,
    pub party_id: String,
    pub role: Role,
    pub token: String,
    #[serde(default)]
    pub versions_url: Option<String>,
    /// Start the handshake right after start-up (outbound entries only)
    #[serde(default = "default_true")]
    pub register_on_start: bool,
}

fn default_true() -> bool {
    true
}

impl BootstrapConfig {
    pub fn remote_party_id(&self) -> Result<RemotePartyId, ConfigError> {
        Ok(RemotePartyId::new(
            CountryCode::new(self.country_code.as_str())?,
            PartyId::new(self.party_id.as_str())?,
            self.role,
        ))
    }

    pub fn is_outbound(&self) -> bool {
        self.versions_url.is_some()
    }

    /// Registry entry seeded from this token
    pub fn remote_party(&self) -> Result<RemoteParty, ConfigError> {
        let id = self.remote_party_id()?;
        let token = AccessToken::new(self.token.as_str())?;
        Ok(match &self.versions_url {
            Some(url) => RemoteParty::with_remote_access(
                id,
                RemoteAccessInfo::new(token, url.as_str()),
                PartyStatus::Enabled,
            ),
            None => RemoteParty::with_access_token(
                id,
                AccessInfo::new(token, AccessStatus::Allowed),
                PartyStatus::Enabled,
            ),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcpiConfig {
    pub version: String,
    pub roles: Vec<RoleConfig>,
    /// Send outbound tokens base64-encoded
    pub base64_tokens: bool,
    pub allow_downgrades: bool,
    pub keep_removed_evses: bool,
    /// Serve the open-data endpoints to callers without a token
    pub allow_open_data: bool,
    pub bootstrap: Vec<BootstrapConfig>,
}

impl Default for OcpiConfig {
    fn default() -> Self {
        Self {
            version: "2.2.1".to_string(),
            roles: vec![RoleConfig {
                role: Role::Cpo,
                country_code: "UZ".to_string(),
                party_id: "TNX".to_string(),
                name: "Texnouz".to_string(),
                website: None,
            }],
            base64_tokens: true,
            allow_downgrades: false,
            keep_removed_evses: true,
            allow_open_data: false,
            bootstrap: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub request_timeout_secs: u64,
    /// Extra attempts of the versions call
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Append-only JSON lines of registry mutations
    pub audit_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            audit_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load and validate `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocpi.roles.is_empty() {
            return Err(ConfigError::Invalid("ocpi.roles must not be empty".into()));
        }
        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("client.request_timeout_secs must be positive".into()));
        }
        if !self.server.base_path.is_empty() && !self.server.base_path.starts_with('/') {
            return Err(ConfigError::Invalid("server.base_path must start with '/'".into()));
        }
        VersionId::new(self.ocpi.version.as_str())?;
        self.credentials_roles()?;
        for entry in &self.ocpi.bootstrap {
            entry.remote_party()?;
        }
        Ok(())
    }

    fn credentials_roles(&self) -> Result<Vec<CredentialsRole>, ConfigError> {
        self.ocpi
            .roles
            .iter()
            .map(|role| -> Result<CredentialsRole, ConfigError> {
                Ok(CredentialsRole {
                    role: role.role,
                    business_details: BusinessDetails {
                        name: role.name.clone(),
                        website: role.website.clone(),
                    },
                    party_id: PartyId::new(role.party_id.as_str())?,
                    country_code: CountryCode::new(role.country_code.as_str())?,
                })
            })
            .collect()
    }

    pub fn local_party(&self) -> Result<LocalParty, ConfigError> {
        Ok(LocalParty::new(
            VersionId::new(self.ocpi.version.as_str())?,
            self.server.public_url(),
            self.credentials_roles()?,
            self.ocpi.allow_open_data,
        ))
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            request_timeout: Duration::from_secs(self.client.request_timeout_secs),
            max_retries: self.client.max_retries,
        }
    }
}

/// `~/.config/texnouz-ocpi/config.toml`, or `./config.toml` without a config dir
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("texnouz-ocpi").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}
