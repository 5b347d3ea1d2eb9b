pub mod events;
pub mod ids;
pub mod record;
pub mod time;

pub use events::{LinkEvent, LinkEventKind, NotificationSink};
pub use ids::{AllianceId, CharacterId, CorporationId, DiscordId};
pub use record::{Affiliation, Alliance, Corporation, CredentialRecord, LinkStatus};
pub use time::{Clock, SystemClock, Timestamp};
