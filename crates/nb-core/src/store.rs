//! In-process `SubscriberStore`.
//!
//! Nothing survives a restart; the SQLite adapter is the production store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    domain::{ChatId, Subscriber, Watermark},
    errors::StorageError,
    ports::SubscriberStore,
};

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<ChatId, Subscriber>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn get(&self, chat_id: ChatId) -> Result<Option<Subscriber>, StorageError> {
        Ok(self.rows.lock().await.get(&chat_id).cloned())
    }

    async fn get_or_create(&self, chat_id: ChatId) -> Result<Subscriber, StorageError> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .entry(chat_id)
            .or_insert_with(|| Subscriber::new(chat_id))
            .clone())
    }

    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        rows.entry(chat_id)
            .or_insert_with(|| Subscriber::new(chat_id))
            .subscribed = subscribed;
        Ok(())
    }

    async fn list_subscribed(&self) -> Result<BTreeSet<ChatId>, StorageError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|s| s.subscribed)
            .map(|s| s.chat_id)
            .collect())
    }

    async fn get_last_delivered(&self, chat_id: ChatId) -> Result<Option<Watermark>, StorageError> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&chat_id)
            .and_then(Subscriber::watermark))
    }

    async fn set_last_delivered(
        &self,
        chat_id: ChatId,
        watermark: &Watermark,
    ) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .entry(chat_id)
            .or_insert_with(|| Subscriber::new(chat_id));

        if let Some(current) = row.watermark() {
            if current.would_regress_to(watermark) {
                tracing::warn!(
                    chat_id = chat_id.0,
                    current = %current.id,
                    rejected = %watermark.id,
                    "ignoring watermark older than the stored one"
                );
                return Ok(());
            }
        }

        row.last_delivered_id = Some(watermark.id.clone());
        row.last_delivered_at = watermark.published_at;
        Ok(())
    }
}
