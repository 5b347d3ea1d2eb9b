use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::DiscordId;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkEventKind {
    Linked,
    ReauthRequired,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkEvent {
    pub discord_id: DiscordId,
    pub kind: LinkEventKind,
}

/// Delivery is a collaborator concern; the core only emits. An implementation
/// that cannot reach the user should fail soft and let the caller log it.
#[async_trait]
pub trait NotificationSink {
    type Error;

    async fn notify(&self, event: LinkEvent) -> Result<(), Self::Error>;
}
