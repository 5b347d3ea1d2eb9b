use thiserror::Error;

pub type SsoResult<T> = Result<T, SsoError>;

#[derive(Debug, Error)]
pub enum SsoError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid authorization state: {0}")]
    InvalidState(String),
    #[error("state token could not be issued: {0}")]
    StateSigning(#[source] jsonwebtoken::errors::Error),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("token endpoint request failed: {0}")]
    TokenEndpoint(#[source] reqwest::Error),
    #[error("token endpoint rejected the grant ({status}): {detail}")]
    GrantRejected { status: u16, detail: String },
    #[error("token response is missing a refresh token")]
    MissingRefreshToken,
    #[error("access token verification failed: {0}")]
    Verification(String),
    #[error("affiliation lookup failed for {resource}: {detail}")]
    Affiliation { resource: String, detail: String },
    #[error("{0}")]
    Message(String),
}

impl SsoError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    pub fn affiliation(resource: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Affiliation {
            resource: resource.into(),
            detail: detail.into(),
        }
    }
}
