use std::time::Duration;

use crate::{SsoError, SsoResult};

pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.eveonline.com";
pub const DEFAULT_ESI_BASE_URL: &str = "https://esi.evetech.net";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsoConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub scopes: Vec<String>,
    pub user_agent: String,
    pub login_base_url: String,
    pub esi_base_url: String,
    pub request_timeout: Duration,
}

impl SsoConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
        scopes: Vec<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            scopes,
            user_agent: user_agent.into(),
            login_base_url: DEFAULT_LOGIN_BASE_URL.to_owned(),
            esi_base_url: DEFAULT_ESI_BASE_URL.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn validate(&self) -> SsoResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(SsoError::InvalidConfig("EVE_CLIENT_ID must be set"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(SsoError::InvalidConfig("EVE_CLIENT_SECRET must be set"));
        }
        if self.callback_url.trim().is_empty() {
            return Err(SsoError::InvalidConfig("EVE_CALLBACK_URL must be set"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(SsoError::InvalidConfig("user_agent must be set"));
        }
        if self.request_timeout.is_zero() {
            return Err(SsoError::InvalidConfig("request timeout must be non-zero"));
        }
        Ok(())
    }

    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
