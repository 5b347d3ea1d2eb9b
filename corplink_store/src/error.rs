#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{column} value {value} does not fit into sqlite INTEGER")]
    IdOverflow { column: &'static str, value: u64 },

    #[error("{column} holds negative value {value}")]
    NegativeId { column: &'static str, value: i64 },

    #[error("{column} holds out-of-range timestamp {value}")]
    InvalidTimestamp { column: &'static str, value: i64 },

    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}
