pub mod affiliation;
pub mod client;
pub mod config;
pub mod errors;
pub mod state;

pub use affiliation::{AffiliationClient, AllianceInfo, CorporationInfo, EsiAffiliationClient};
pub use client::{HttpSsoClient, LoginRequest, SsoClient, TokenGrant, VerifiedCharacter};
pub use config::SsoConfig;
pub use errors::{SsoError, SsoResult};
pub use state::{PendingLink, StateCodec};
