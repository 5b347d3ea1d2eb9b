mod credential_store;
mod error;

pub use credential_store::{CredentialStore, SqliteCredentialStore};
pub use error::StoreError;
