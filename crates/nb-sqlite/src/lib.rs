//! SQLite adapter (sqlx) for the `nb-core` SubscriberStore port.

use std::{collections::BTreeSet, path::Path, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use nb_core::{
    domain::{ChatId, Subscriber, Watermark},
    ports::SubscriberStore,
    StorageError,
};

type SubscriberRow = (i64, bool, Option<String>, Option<i64>);

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}", path.display());
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(db_err)?
            .create_if_missing(true)
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; a handful of connections covers the poll
        // loop plus concurrent command handlers.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(path = %path.display(), "subscriber store opened");
        Ok(store)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_err)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id INTEGER PRIMARY KEY,
                subscribed INTEGER NOT NULL DEFAULT 0,
                last_delivered_id TEXT,
                -- unix milliseconds
                last_delivered_at INTEGER,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscribers_subscribed ON subscribers(subscribed)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn insert_if_missing(&self, chat_id: ChatId) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO subscribers (chat_id, subscribed, created_at) VALUES (?, 0, ?) \
             ON CONFLICT(chat_id) DO NOTHING",
        )
        .bind(chat_id.0)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn to_time(chat_id: i64, millis: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    match millis {
        None => Ok(None),
        Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| StorageError::Corrupt {
                chat_id,
                reason: format!("last_delivered_at out of range: {ms}"),
            }),
    }
}

fn to_subscriber(row: SubscriberRow) -> Result<Subscriber, StorageError> {
    let (chat_id, subscribed, last_delivered_id, last_delivered_at) = row;
    Ok(Subscriber {
        chat_id: ChatId(chat_id),
        subscribed,
        last_delivered_id,
        last_delivered_at: to_time(chat_id, last_delivered_at)?,
    })
}

#[async_trait]
impl SubscriberStore for SqliteStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<Subscriber>, StorageError> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            "SELECT chat_id, subscribed, last_delivered_id, last_delivered_at \
             FROM subscribers WHERE chat_id = ?",
        )
        .bind(chat_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(to_subscriber).transpose()
    }

    async fn get_or_create(&self, chat_id: ChatId) -> Result<Subscriber, StorageError> {
        self.insert_if_missing(chat_id).await?;
        self.get(chat_id).await?.ok_or_else(|| StorageError::Corrupt {
            chat_id: chat_id.0,
            reason: "row vanished after insert".to_string(),
        })
    }

    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO subscribers (chat_id, subscribed, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(chat_id) DO UPDATE SET subscribed = excluded.subscribed",
        )
        .bind(chat_id.0)
        .bind(subscribed)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_subscribed(&self) -> Result<BTreeSet<ChatId>, StorageError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT chat_id FROM subscribers WHERE subscribed = 1")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(|(id,)| ChatId(id)).collect())
    }

    async fn get_last_delivered(&self, chat_id: ChatId) -> Result<Option<Watermark>, StorageError> {
        Ok(self.get(chat_id).await?.and_then(|s| s.watermark()))
    }

    async fn set_last_delivered(
        &self,
        chat_id: ChatId,
        watermark: &Watermark,
    ) -> Result<(), StorageError> {
        let at = watermark.published_at.map(|t| t.timestamp_millis());
        // The WHERE clause keeps the watermark from moving back in publish order.
        let res = sqlx::query(
            "INSERT INTO subscribers (chat_id, subscribed, last_delivered_id, last_delivered_at, created_at) \
             VALUES (?, 0, ?, ?, ?) \
             ON CONFLICT(chat_id) DO UPDATE SET \
                 last_delivered_id = excluded.last_delivered_id, \
                 last_delivered_at = excluded.last_delivered_at \
             WHERE subscribers.last_delivered_at IS NULL \
                OR excluded.last_delivered_at IS NULL \
                OR excluded.last_delivered_at >= subscribers.last_delivered_at",
        )
        .bind(chat_id.0)
        .bind(watermark.id.as_str())
        .bind(at)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            tracing::warn!(
                chat_id = chat_id.0,
                rejected = %watermark.id,
                "ignoring watermark older than the stored one"
            );
        }
        Ok(())
    }
}
