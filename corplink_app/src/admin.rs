use std::{collections::HashMap, time::Duration};

use serde::Serialize;

use corplink_core::{CredentialRecord, DiscordId, LinkStatus, Timestamp};
use corplink_store::CredentialStore;

use crate::LinkError;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LinkStatusEntry {
    pub record: CredentialRecord,
    pub status: LinkStatus,
}

/// Every record with its computed status. `recent_failures` comes from a
/// running sweeper; a cold caller passes an empty map and still sees expired
/// records as needs-reauth.
pub async fn link_status_report<S>(
    store: &S,
    recent_failures: &HashMap<DiscordId, String>,
    now: Timestamp,
    horizon: Duration,
) -> Result<Vec<LinkStatusEntry>, LinkError>
where
    S: CredentialStore,
{
    let records = store.list_all().await?;

    Ok(records
        .into_iter()
        .map(|record| {
            let refresh_failed = recent_failures
                .get(&record.discord_id)
                .is_some_and(|token| *token == record.refresh_token);
            let status = record.status(now, horizon, refresh_failed);
            LinkStatusEntry { record, status }
        })
        .collect())
}

pub async fn remove_link<S>(store: &S, discord_id: &DiscordId) -> Result<(), LinkError>
where
    S: CredentialStore,
{
    store.delete(discord_id).await?;
    log::info!("removed credential record for {discord_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashMap},
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use corplink_core::{
        Affiliation, CharacterId, CredentialRecord, DiscordId, LinkStatus, Timestamp,
    };
    use corplink_store::{CredentialStore, StoreError};

    use super::{link_status_report, remove_link};

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<BTreeMap<String, CredentialRecord>>,
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get(
            &self,
            discord_id: &DiscordId,
        ) -> Result<Option<CredentialRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .expect("records lock")
                .get(discord_id.as_str())
                .cloned())
        }

        async fn upsert(&self, record: &CredentialRecord) -> Result<(), StoreError> {
            self.records
                .lock()
                .expect("records lock")
                .insert(record.discord_id.as_str().to_owned(), record.clone());
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .expect("records lock")
                .values()
                .cloned()
                .collect())
        }

        async fn list_expiring_within(
            &self,
            now: Timestamp,
            horizon: Duration,
        ) -> Result<Vec<CredentialRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .expect("records lock")
                .values()
                .filter(|record| record.expires_within(now, horizon))
                .cloned()
                .collect())
        }

        async fn delete(&self, discord_id: &DiscordId) -> Result<(), StoreError> {
            self.records
                .lock()
                .expect("records lock")
                .remove(discord_id.as_str());
            Ok(())
        }
    }

    fn record(discord_id: &str, refresh_token: &str, expires_at: Timestamp) -> CredentialRecord {
        CredentialRecord {
            discord_id: DiscordId::new(discord_id),
            discord_name: format!("user-{discord_id}"),
            character_id: CharacterId(9001),
            character_name: "Pilot".to_owned(),
            affiliation: Affiliation::default(),
            access_token: "access".to_owned(),
            refresh_token: refresh_token.to_owned(),
            token_expires_at: expires_at,
            last_synced_at: ts(1_699_990_000),
            created_at: ts(1_699_000_000),
        }
    }

    #[tokio::test]
    async fn report_classifies_records_by_expiry_and_failure() {
        let store = MemoryStore::default();
        let now = ts(1_700_000_000);
        let horizon = Duration::from_secs(3_600);

        store
            .upsert(&record("valid", "r1", ts(1_700_010_000)))
            .await
            .expect("seed valid");
        store
            .upsert(&record("near", "r2", ts(1_700_001_800)))
            .await
            .expect("seed near");
        store
            .upsert(&record("expired", "r3", ts(1_699_999_000)))
            .await
            .expect("seed expired");
        store
            .upsert(&record("rejected", "r4", ts(1_700_010_000)))
            .await
            .expect("seed rejected");

        let mut failures = HashMap::new();
        failures.insert(DiscordId::new("rejected"), "r4".to_owned());
        // a stale failure entry for a since-rotated token must not flag
        failures.insert(DiscordId::new("valid"), "old-r1".to_owned());

        let report = link_status_report(&store, &failures, now, horizon)
            .await
            .expect("report");

        let status_of = |id: &str| {
            report
                .iter()
                .find(|entry| entry.record.discord_id.as_str() == id)
                .expect("entry present")
                .status
        };

        assert_eq!(status_of("valid"), LinkStatus::Valid);
        assert_eq!(status_of("near"), LinkStatus::NearExpiry);
        assert_eq!(status_of("expired"), LinkStatus::NeedsReauth);
        assert_eq!(status_of("rejected"), LinkStatus::NeedsReauth);
    }

    #[tokio::test]
    async fn remove_link_deletes_the_record() {
        let store = MemoryStore::default();
        store
            .upsert(&record("100", "r1", ts(1_700_010_000)))
            .await
            .expect("seed");

        remove_link(&store, &DiscordId::new("100"))
            .await
            .expect("remove");

        assert!(store.list_all().await.expect("list").is_empty());
    }

    fn ts(epoch_secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(epoch_secs).expect("valid epoch seconds")
    }
}
