#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("discord id must not be empty")]
    MissingIdentity,

    #[error("invalid authorization state: {0}")]
    InvalidState(String),

    #[error("state token could not be issued: {0}")]
    StateSigning(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("store error: {0}")]
    Store(#[from] corplink_store::StoreError),
}
