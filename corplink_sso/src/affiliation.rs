use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use corplink_core::{AllianceId, CharacterId, CorporationId};

use crate::{SsoError, SsoResult, config::SsoConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorporationInfo {
    pub name: String,
    pub ticker: String,
    pub alliance_id: Option<AllianceId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllianceInfo {
    pub name: String,
    pub ticker: String,
}

/// Read-only lookups against public ESI. Each call stands alone so a caller
/// can keep whatever subset succeeded.
#[async_trait]
pub trait AffiliationClient {
    async fn character_corporation(&self, character_id: CharacterId) -> SsoResult<CorporationId>;
    async fn corporation(&self, corporation_id: CorporationId) -> SsoResult<CorporationInfo>;
    async fn alliance(&self, alliance_id: AllianceId) -> SsoResult<AllianceInfo>;
}

#[derive(Clone)]
pub struct EsiAffiliationClient {
    http: reqwest::Client,
    base: Url,
}

impl EsiAffiliationClient {
    pub fn new(config: &SsoConfig) -> SsoResult<Self> {
        let base = Url::parse(&config.esi_base_url)
            .map_err(|_| SsoError::InvalidConfig("esi base URL is not a valid URL"))?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(SsoError::HttpClient)?;

        Ok(Self { http, base })
    }

    async fn fetch<T>(&self, path: &str) -> SsoResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|_| SsoError::affiliation(path, "path does not resolve against the ESI base"))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| SsoError::affiliation(path, err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SsoError::affiliation(path, format!("status {status}")));
        }

        response
            .json()
            .await
            .map_err(|err| SsoError::affiliation(path, err.to_string()))
    }
}

#[async_trait]
impl AffiliationClient for EsiAffiliationClient {
    async fn character_corporation(&self, character_id: CharacterId) -> SsoResult<CorporationId> {
        #[derive(Deserialize)]
        struct CharacterPublic {
            corporation_id: u64,
        }

        let body: CharacterPublic = self
            .fetch(&format!("/latest/characters/{character_id}/"))
            .await?;
        Ok(CorporationId(body.corporation_id))
    }

    async fn corporation(&self, corporation_id: CorporationId) -> SsoResult<CorporationInfo> {
        #[derive(Deserialize)]
        struct CorporationPublic {
            name: String,
            ticker: String,
            alliance_id: Option<u64>,
        }

        let body: CorporationPublic = self
            .fetch(&format!("/latest/corporations/{corporation_id}/"))
            .await?;
        Ok(CorporationInfo {
            name: body.name,
            ticker: body.ticker,
            alliance_id: body.alliance_id.map(AllianceId),
        })
    }

    async fn alliance(&self, alliance_id: AllianceId) -> SsoResult<AllianceInfo> {
        #[derive(Deserialize)]
        struct AlliancePublic {
            name: String,
            ticker: String,
        }

        let body: AlliancePublic = self
            .fetch(&format!("/latest/alliances/{alliance_id}/"))
            .await?;
        Ok(AllianceInfo {
            name: body.name,
            ticker: body.ticker,
        })
    }
}
