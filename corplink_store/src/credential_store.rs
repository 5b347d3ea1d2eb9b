use std::{path::Path, time::Duration};

use async_trait::async_trait;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use corplink_core::{
    Affiliation, Alliance, AllianceId, CharacterId, Corporation, CorporationId, CredentialRecord,
    DiscordId, Timestamp,
};

use crate::StoreError;

#[async_trait]
pub trait CredentialStore {
    async fn get(&self, discord_id: &DiscordId) -> Result<Option<CredentialRecord>, StoreError>;

    /// Insert-or-replace keyed by discord id. A re-link overwrites every
    /// column except `created_at`, which the first insert owns forever.
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError>;

    /// Records whose expiry falls at or before `now + horizon`.
    async fn list_expiring_within(
        &self,
        now: Timestamp,
        horizon: Duration,
    ) -> Result<Vec<CredentialRecord>, StoreError>;

    async fn delete(&self, discord_id: &DiscordId) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(connect_options)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// created_at is deliberately missing from the update list.
const UPSERT_SQL: &str = "
INSERT INTO credentials (
    discord_id, discord_name, character_id, character_name,
    corporation_id, corporation_name, corporation_ticker,
    alliance_id, alliance_name, alliance_ticker,
    access_token, refresh_token,
    token_expires_at_epoch_secs, last_synced_at_epoch_secs, created_at_epoch_secs
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
ON CONFLICT(discord_id) DO UPDATE SET
    discord_name = excluded.discord_name,
    character_id = excluded.character_id,
    character_name = excluded.character_name,
    corporation_id = excluded.corporation_id,
    corporation_name = excluded.corporation_name,
    corporation_ticker = excluded.corporation_ticker,
    alliance_id = excluded.alliance_id,
    alliance_name = excluded.alliance_name,
    alliance_ticker = excluded.alliance_ticker,
    access_token = excluded.access_token,
    refresh_token = excluded.refresh_token,
    token_expires_at_epoch_secs = excluded.token_expires_at_epoch_secs,
    last_synced_at_epoch_secs = excluded.last_synced_at_epoch_secs
";

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, discord_id: &DiscordId) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, DbCredentialRow>(
            "SELECT * FROM credentials WHERE discord_id = ?1",
        )
        .bind(discord_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CredentialRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let corporation = record.affiliation.corporation.as_ref();
        let alliance = record.affiliation.alliance.as_ref();

        sqlx::query(UPSERT_SQL)
            .bind(record.discord_id.as_str())
            .bind(&record.discord_name)
            .bind(id_to_sql("character_id", record.character_id.0)?)
            .bind(&record.character_name)
            .bind(
                corporation
                    .map(|c| id_to_sql("corporation_id", c.id.0))
                    .transpose()?,
            )
            .bind(corporation.map(|c| c.name.as_str()))
            .bind(corporation.map(|c| c.ticker.as_str()))
            .bind(
                alliance
                    .map(|a| id_to_sql("alliance_id", a.id.0))
                    .transpose()?,
            )
            .bind(alliance.map(|a| a.name.as_str()))
            .bind(alliance.map(|a| a.ticker.as_str()))
            .bind(&record.access_token)
            .bind(&record.refresh_token)
            .bind(record.token_expires_at.as_epoch_secs())
            .bind(record.last_synced_at.as_epoch_secs())
            .bind(record.created_at.as_epoch_secs())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query_as::<_, DbCredentialRow>(
            "SELECT * FROM credentials ORDER BY discord_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CredentialRecord::try_from).collect()
    }

    async fn list_expiring_within(
        &self,
        now: Timestamp,
        horizon: Duration,
    ) -> Result<Vec<CredentialRecord>, StoreError> {
        let cutoff = now.saturating_add(horizon).as_epoch_secs();

        let rows = sqlx::query_as::<_, DbCredentialRow>(
            "SELECT * FROM credentials
             WHERE token_expires_at_epoch_secs <= ?1
             ORDER BY token_expires_at_epoch_secs",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CredentialRecord::try_from).collect()
    }

    async fn delete(&self, discord_id: &DiscordId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM credentials WHERE discord_id = ?1")
            .bind(discord_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct DbCredentialRow {
    discord_id: String,
    discord_name: String,
    character_id: i64,
    character_name: String,
    corporation_id: Option<i64>,
    corporation_name: Option<String>,
    corporation_ticker: Option<String>,
    alliance_id: Option<i64>,
    alliance_name: Option<String>,
    alliance_ticker: Option<String>,
    access_token: String,
    refresh_token: String,
    token_expires_at_epoch_secs: i64,
    last_synced_at_epoch_secs: i64,
    created_at_epoch_secs: i64,
}

impl TryFrom<DbCredentialRow> for CredentialRecord {
    type Error = StoreError;

    fn try_from(row: DbCredentialRow) -> Result<Self, Self::Error> {
        let corporation = match (row.corporation_id, row.corporation_name, row.corporation_ticker)
        {
            (Some(id), Some(name), Some(ticker)) => Some(Corporation {
                id: CorporationId(id_from_sql("corporation_id", id)?),
                name,
                ticker,
            }),
            _ => None,
        };

        let alliance = match (row.alliance_id, row.alliance_name, row.alliance_ticker) {
            (Some(id), Some(name), Some(ticker)) => Some(Alliance {
                id: AllianceId(id_from_sql("alliance_id", id)?),
                name,
                ticker,
            }),
            _ => None,
        };

        Ok(Self {
            discord_id: DiscordId::new(row.discord_id),
            discord_name: row.discord_name,
            character_id: CharacterId(id_from_sql("character_id", row.character_id)?),
            character_name: row.character_name,
            affiliation: Affiliation {
                corporation,
                alliance,
            },
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_expires_at: timestamp_from_sql(
                "token_expires_at_epoch_secs",
                row.token_expires_at_epoch_secs,
            )?,
            last_synced_at: timestamp_from_sql(
                "last_synced_at_epoch_secs",
                row.last_synced_at_epoch_secs,
            )?,
            created_at: timestamp_from_sql("created_at_epoch_secs", row.created_at_epoch_secs)?,
        })
    }
}

fn id_to_sql(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::IdOverflow { column, value })
}

fn id_from_sql(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::NegativeId { column, value })
}

fn timestamp_from_sql(column: &'static str, value: i64) -> Result<Timestamp, StoreError> {
    Timestamp::from_epoch_secs(value).ok_or(StoreError::InvalidTimestamp { column, value })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use corplink_core::{
        Affiliation, Alliance, AllianceId, CharacterId, Corporation, CorporationId,
        CredentialRecord, DiscordId, Timestamp,
    };
    use tempfile::tempdir;

    use super::{CredentialStore, SqliteCredentialStore};

    fn full_affiliation() -> Affiliation {
        Affiliation {
            corporation: Some(Corporation {
                id: CorporationId(2001),
                name: "Brave Industries".to_owned(),
                ticker: "BRIN".to_owned(),
            }),
            alliance: Some(Alliance {
                id: AllianceId(3001),
                name: "Test Coalition".to_owned(),
                ticker: "TSTC".to_owned(),
            }),
        }
    }

    fn record(discord_id: &str, expires_at: Timestamp) -> CredentialRecord {
        CredentialRecord {
            discord_id: DiscordId::new(discord_id),
            discord_name: format!("user-{discord_id}"),
            character_id: CharacterId(9001),
            character_name: "Pilot".to_owned(),
            affiliation: full_affiliation(),
            access_token: "access".to_owned(),
            refresh_token: "refresh".to_owned(),
            token_expires_at: expires_at,
            last_synced_at: ts(1_700_000_000),
            created_at: ts(1_700_000_000),
        }
    }

    async fn open_store() -> (tempfile::TempDir, SqliteCredentialStore) {
        let temp_dir = tempdir().expect("tempdir");
        let store = SqliteCredentialStore::connect(temp_dir.path().join("credentials.sqlite"))
            .await
            .expect("connect store");
        (temp_dir, store)
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let (_guard, store) = open_store().await;
        let record = record("100", ts(1_700_010_000));

        store.upsert(&record).await.expect("upsert");

        let loaded = store
            .get(&DiscordId::new("100"))
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded, record);

        assert!(
            store
                .get(&DiscordId::new("999"))
                .await
                .expect("get absent")
                .is_none()
        );
    }

    #[tokio::test]
    async fn partial_affiliation_round_trips_as_absent() {
        let (_guard, store) = open_store().await;
        let mut partial = record("100", ts(1_700_010_000));
        partial.affiliation = Affiliation {
            corporation: Some(Corporation {
                id: CorporationId(2001),
                name: "Brave Industries".to_owned(),
                ticker: "BRIN".to_owned(),
            }),
            alliance: None,
        };

        store.upsert(&partial).await.expect("upsert");

        let loaded = store
            .get(&DiscordId::new("100"))
            .await
            .expect("get")
            .expect("record exists");
        assert_eq!(loaded.affiliation, partial.affiliation);
    }

    #[tokio::test]
    async fn repeated_upsert_keeps_one_row_and_the_original_created_at() {
        let (_guard, store) = open_store().await;

        let first = record("100", ts(1_700_010_000));
        store.upsert(&first).await.expect("first upsert");

        let mut relink = record("100", ts(1_700_020_000));
        relink.character_id = CharacterId(9002);
        relink.character_name = "Alt Pilot".to_owned();
        relink.access_token = "access-2".to_owned();
        relink.refresh_token = "refresh-2".to_owned();
        relink.created_at = ts(1_700_015_000);
        store.upsert(&relink).await.expect("second upsert");

        let all = store.list_all().await.expect("list all");
        assert_eq!(all.len(), 1);

        let loaded = &all[0];
        assert_eq!(loaded.character_id, CharacterId(9002));
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.token_expires_at, ts(1_700_020_000));
        assert_eq!(loaded.created_at, ts(1_700_000_000));
    }

    #[tokio::test]
    async fn list_expiring_within_is_boundary_inclusive() {
        let (_guard, store) = open_store().await;
        let now = ts(1_700_000_000);
        let horizon = Duration::from_secs(3_600);

        store
            .upsert(&record("at-boundary", ts(1_700_003_600)))
            .await
            .expect("upsert boundary");
        store
            .upsert(&record("inside", ts(1_700_001_800)))
            .await
            .expect("upsert inside");
        store
            .upsert(&record("outside", ts(1_700_003_601)))
            .await
            .expect("upsert outside");

        let due = store
            .list_expiring_within(now, horizon)
            .await
            .expect("list expiring");

        let ids: Vec<&str> = due.iter().map(|r| r.discord_id.as_str()).collect();
        assert_eq!(ids, vec!["inside", "at-boundary"]);
    }

    #[tokio::test]
    async fn delete_removes_the_record_and_tolerates_absence() {
        let (_guard, store) = open_store().await;
        store
            .upsert(&record("100", ts(1_700_010_000)))
            .await
            .expect("upsert");

        store.delete(&DiscordId::new("100")).await.expect("delete");
        assert!(store.get(&DiscordId::new("100")).await.expect("get").is_none());

        store
            .delete(&DiscordId::new("100"))
            .await
            .expect("delete absent id is fine");
    }

    #[tokio::test]
    async fn migrations_apply_on_reopen() {
        let temp_dir = tempdir().expect("tempdir");
        let path = temp_dir.path().join("credentials.sqlite");

        let store = SqliteCredentialStore::connect(&path).await.expect("connect");
        store
            .upsert(&record("100", ts(1_700_010_000)))
            .await
            .expect("upsert");
        drop(store);

        let reopened = SqliteCredentialStore::connect(&path)
            .await
            .expect("reconnect");
        assert_eq!(reopened.list_all().await.expect("list").len(), 1);
    }

    fn ts(epoch_secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(epoch_secs).expect("valid epoch seconds")
    }
}
