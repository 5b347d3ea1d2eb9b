use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use corplink_core::{Clock, Timestamp};
use corplink_store::SqliteCredentialStore;
use tempfile::TempDir;

pub struct TestHarness {
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let db_path = temp_dir.path().join("credentials.sqlite");
        Self {
            _temp_dir: temp_dir,
            db_path,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn store(&self) -> SqliteCredentialStore {
        SqliteCredentialStore::connect(self.db_path())
            .await
            .expect("connect store")
    }
}

/// A clock whose hands every participant shares; tests move it forward.
#[derive(Clone)]
pub struct SharedClock(Arc<Mutex<i64>>);

impl SharedClock {
    pub fn starting_at(epoch_secs: i64) -> Self {
        Self(Arc::new(Mutex::new(epoch_secs)))
    }

    pub fn advance_to(&self, epoch_secs: i64) {
        *self.0.lock().expect("clock lock") = epoch_secs;
    }
}

impl Clock for SharedClock {
    fn now(&self) -> Timestamp {
        ts(*self.0.lock().expect("clock lock"))
    }
}

pub fn ts(epoch_secs: i64) -> Timestamp {
    Timestamp::from_epoch_secs(epoch_secs).expect("valid epoch seconds")
}
