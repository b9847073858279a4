use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, FeedItem, Subscriber, Watermark},
    errors::{FetchError, StorageError},
};

/// Retrieves and parses a remote feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Items newest first. Pure retrieval + parse, no side effects.
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, FetchError>;
}

/// Persists subscriber identity, subscription state and the delivery watermark.
///
/// Implementations make each call atomic on its own; read-modify-write
/// sequences across calls are serialized by the caller via `ChatLocks`.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get(&self, chat_id: ChatId) -> Result<Option<Subscriber>, StorageError>;

    async fn get_or_create(&self, chat_id: ChatId) -> Result<Subscriber, StorageError>;

    /// Creates the record if it does not exist yet.
    async fn set_subscribed(&self, chat_id: ChatId, subscribed: bool) -> Result<(), StorageError>;

    async fn list_subscribed(&self) -> Result<BTreeSet<ChatId>, StorageError>;

    async fn get_last_delivered(&self, chat_id: ChatId) -> Result<Option<Watermark>, StorageError>;

    /// Advances the watermark. A watermark older than the stored one is ignored.
    async fn set_last_delivered(
        &self,
        chat_id: ChatId,
        watermark: &Watermark,
    ) -> Result<(), StorageError>;
}
