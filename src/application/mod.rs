pub mod credentials;
pub mod discovery;
pub mod local_party;
pub mod ports;

pub use credentials::CredentialsService;
pub use discovery::{DiscoveryOptions, VersionDiscoveryClient};
pub use local_party::{Audience, LocalParty};
