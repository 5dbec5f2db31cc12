use std::str::FromStr;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use rivalroll_core::{CustomIconMap, HistoryEntry, PlayerId, ICONS_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to decode `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: sqlx::Error,
    },
}

/// JSON documents under fixed string keys, backed by the `kv` table.
#[derive(Clone)]
pub struct KvStore {
    db: SqlitePool,
}

impl KvStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::init(db).await
    }

    /// Single-connection in-memory database; the connection is never recycled
    /// so the data lives as long as the pool.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::init(db).await
    }

    async fn init(db: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db })
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(|source| StorageError::Read {
                key: key.to_string(),
                source,
            })?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn put_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await
        .map_err(|source| StorageError::Write {
            key: key.to_string(),
            source,
        })?;
        Ok(())
    }

    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Reads `key`, substituting the default when it is absent or unreadable.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.read_json(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key, "no stored value, using default");
                T::default()
            }
            Err(err) => {
                warn!(error = %err, "storage read failed, using default");
                T::default()
            }
        }
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.put_raw(key, &raw).await
    }

    pub async fn load_history(&self, player: PlayerId) -> Vec<HistoryEntry> {
        self.load_or_default(player.history_key()).await
    }

    pub async fn save_history(
        &self,
        player: PlayerId,
        history: &[HistoryEntry],
    ) -> Result<(), StorageError> {
        self.write_json(player.history_key(), history).await
    }

    pub async fn load_icons(&self) -> CustomIconMap {
        self.load_or_default(ICONS_KEY).await
    }

    pub async fn save_icons(&self, icons: &CustomIconMap) -> Result<(), StorageError> {
        self.write_json(ICONS_KEY, icons).await
    }
}
