use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use corplink_core::{DiscordId, Timestamp};

use crate::{SsoError, SsoResult};

pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(3_600);

/// Everything the callback needs to finish a link. Rides in the `state`
/// query parameter as a signed token, so no pending-login table exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingLink {
    pub discord_id: DiscordId,
    pub discord_name: String,
    pub issued_at: Timestamp,
}

#[derive(Serialize, Deserialize)]
struct StateClaims {
    sub: String,
    name: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct StateCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl StateCodec {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, DEFAULT_STATE_TTL)
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn encode(&self, pending: &PendingLink) -> SsoResult<String> {
        let expires_at = pending
            .issued_at
            .checked_add(self.ttl)
            .ok_or_else(|| SsoError::message("state expiry overflows the timestamp range"))?;

        let claims = StateClaims {
            sub: pending.discord_id.as_str().to_owned(),
            name: pending.discord_name.clone(),
            iat: pending.issued_at.as_epoch_secs(),
            exp: expires_at.as_epoch_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(SsoError::StateSigning)
    }

    /// Expiry is checked against the caller's clock rather than the wall
    /// clock jsonwebtoken would use, keeping decode deterministic under test.
    pub fn decode(&self, raw: &str, now: Timestamp) -> SsoResult<PendingLink> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<StateClaims>(raw, &self.decoding_key, &validation)
            .map_err(|err| SsoError::InvalidState(err.to_string()))?;

        if data.claims.exp < now.as_epoch_secs() {
            return Err(SsoError::InvalidState("state token has expired".to_owned()));
        }
        if data.claims.sub.trim().is_empty() {
            return Err(SsoError::InvalidState("state carries no discord id".to_owned()));
        }

        let issued_at = Timestamp::from_epoch_secs(data.claims.iat).ok_or_else(|| {
            SsoError::InvalidState(format!("issued-at {} is out of range", data.claims.iat))
        })?;

        Ok(PendingLink {
            discord_id: DiscordId::new(data.claims.sub),
            discord_name: data.claims.name,
            issued_at,
        })
    }
}
