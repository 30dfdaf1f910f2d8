pub mod cdr;
pub mod error;
pub mod identifiers;
pub mod location;
pub mod ocpi;
pub mod party;
pub mod resource;
pub mod session;
pub mod tariff;
pub mod token;

// Re-export commonly used types
pub use cdr::Cdr;
pub use error::{DomainError, DomainResult};
pub use identifiers::{
    AccessToken, CdrId, ConnectorId, CountryCode, EvseId, EvseUid, IdentifierError, LocationId,
    PartyId, PartyKey, SessionId, TariffId, TokenId, VersionId,
};
pub use location::{Connector, Evse, EvseStatus, Location};
pub use party::{
    AccessInfo, AccessStatus, PartyStatus, RemoteAccessInfo, RemoteAccessStatus, RemoteParty,
    RemotePartyId,
};
pub use resource::OcpiResource;
pub use session::Session;
pub use tariff::Tariff;
pub use token::Token;
