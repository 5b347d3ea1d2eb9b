use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    ids::{AllianceId, CharacterId, CorporationId, DiscordId},
    time::Timestamp,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Corporation {
    pub id: CorporationId,
    pub name: String,
    pub ticker: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alliance {
    pub id: AllianceId,
    pub name: String,
    pub ticker: String,
}

/// Corporation membership plus the corporation's alliance, when it has one.
/// Both halves may be absent after a best-effort resolution failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Affiliation {
    pub corporation: Option<Corporation>,
    pub alliance: Option<Alliance>,
}

impl Affiliation {
    pub fn is_resolved(&self) -> bool {
        self.corporation.is_some()
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub discord_id: DiscordId,
    pub discord_name: String,
    pub character_id: CharacterId,
    pub character_name: String,
    pub affiliation: Affiliation,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub token_expires_at: Timestamp,
    pub last_synced_at: Timestamp,
    pub created_at: Timestamp,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Valid,
    NearExpiry,
    NeedsReauth,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "valid",
            Self::NearExpiry => "near-expiry",
            Self::NeedsReauth => "needs-reauth",
        };
        f.pad(label)
    }
}

impl CredentialRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.token_expires_at <= now
    }

    /// Boundary inclusive: a token expiring exactly at `now + horizon` is due.
    pub fn expires_within(&self, now: Timestamp, horizon: Duration) -> bool {
        match now.checked_add(horizon) {
            Some(cutoff) => self.token_expires_at <= cutoff,
            None => true,
        }
    }

    pub fn status(&self, now: Timestamp, horizon: Duration, last_refresh_failed: bool) -> LinkStatus {
        if last_refresh_failed || self.is_expired(now) {
            LinkStatus::NeedsReauth
        } else if self.expires_within(now, horizon) {
            LinkStatus::NearExpiry
        } else {
            LinkStatus::Valid
        }
    }
}
