use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use corplink_core::CharacterId;

use crate::{SsoError, SsoResult, config::SsoConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRequest {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCharacter {
    pub character_id: CharacterId,
    pub character_name: String,
}

#[async_trait]
pub trait SsoClient {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> SsoResult<TokenGrant>;
    async fn exchange_refresh(&self, refresh_token: &str) -> SsoResult<TokenGrant>;
    async fn verify(&self, access_token: &str) -> SsoResult<VerifiedCharacter>;
}

/// Confidential-client EVE SSO: both grants go to the v2 token endpoint with
/// basic-auth client credentials, introspection uses `/oauth/verify`.
#[derive(Clone)]
pub struct HttpSsoClient {
    http: reqwest::Client,
    config: SsoConfig,
    authorize_endpoint: Url,
    token_endpoint: Url,
    verify_endpoint: Url,
}

impl HttpSsoClient {
    pub fn new(config: &SsoConfig) -> SsoResult<Self> {
        config.validate()?;

        let base = Url::parse(&config.login_base_url)
            .map_err(|_| SsoError::InvalidConfig("login base URL is not a valid URL"))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|_| SsoError::InvalidConfig("login base URL cannot carry endpoint paths"))
        };

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(SsoError::HttpClient)?;

        Ok(Self {
            http,
            config: config.clone(),
            authorize_endpoint: join("/v2/oauth/authorize/")?,
            token_endpoint: join("/v2/oauth/token")?,
            verify_endpoint: join("/oauth/verify")?,
        })
    }

    async fn request_grant(&self, form: &[(&str, &str)]) -> SsoResult<TokenGrant> {
        let response = self
            .http
            .post(self.token_endpoint.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await
            .map_err(SsoError::TokenEndpoint)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SsoError::GrantRejected {
                status: status.as_u16(),
                detail,
            });
        }

        let body: TokenResponse = response.json().await.map_err(SsoError::TokenEndpoint)?;
        let refresh_token = body.refresh_token.ok_or(SsoError::MissingRefreshToken)?;

        Ok(TokenGrant {
            access_token: body.access_token,
            refresh_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }
}

#[async_trait]
impl SsoClient for HttpSsoClient {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &self.config.scope_string())
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> SsoResult<TokenGrant> {
        self.request_grant(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    async fn exchange_refresh(&self, refresh_token: &str) -> SsoResult<TokenGrant> {
        self.request_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn verify(&self, access_token: &str) -> SsoResult<VerifiedCharacter> {
        let response = self
            .http
            .get(self.verify_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| SsoError::Verification(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SsoError::Verification(format!(
                "verify endpoint returned {status}"
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|err| SsoError::Verification(err.to_string()))?;

        Ok(VerifiedCharacter {
            character_id: CharacterId(body.character_id),
            character_name: body.character_name,
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(rename = "CharacterID")]
    character_id: u64,
    #[serde(rename = "CharacterName")]
    character_name: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use url::Url;

    use super::HttpSsoClient;
    use crate::{SsoClient, SsoError, config::SsoConfig};

    fn config() -> SsoConfig {
        SsoConfig::new(
            "client-id",
            "client-secret",
            "http://localhost:8714/callback",
            vec!["publicData".to_owned()],
            "corplink-tests/0.1",
        )
    }

    #[test]
    fn authorize_url_carries_the_oauth_query() {
        let client = HttpSsoClient::new(&config()).expect("build client");
        let raw = client.authorize_url("opaque-state");

        let url = Url::parse(&raw).expect("authorize URL parses");
        assert_eq!(url.host_str(), Some("login.eveonline.com"));
        assert_eq!(url.path(), "/v2/oauth/authorize/");

        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            query.get("redirect_uri").map(String::as_str),
            Some("http://localhost:8714/callback")
        );
        assert_eq!(query.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(query.get("scope").map(String::as_str), Some("publicData"));
        assert_eq!(query.get("state").map(String::as_str), Some("opaque-state"));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let mut config = config();
        config.login_base_url = "not a url".to_owned();

        assert!(matches!(
            HttpSsoClient::new(&config),
            Err(SsoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn blank_config_is_rejected_before_any_request() {
        let mut config = config();
        config.client_id = String::new();

        assert!(matches!(
            HttpSsoClient::new(&config),
            Err(SsoError::InvalidConfig(_))
        ));
    }
}
