//! OCPI protocol vocabulary shared by every module

pub mod credentials;
pub mod response;
pub mod role;
pub mod status;
pub mod version;

pub use credentials::{BusinessDetails, Credentials, CredentialsRole};
pub use response::OcpiResponse;
pub use role::{InterfaceRole, ModuleId, Role};
pub use status::StatusCode;
pub use version::{Endpoint, VersionDetail, VersionInfo};
