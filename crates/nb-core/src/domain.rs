use chrono::{DateTime, Utc};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// One normalized feed entry. Two items with the same `id` are the same article.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub author: Option<String>,
    pub summary: Option<String>,
}

/// The newest item already delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Watermark {
    pub id: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl Watermark {
    pub fn of(item: &FeedItem) -> Self {
        Self {
            id: item.id.clone(),
            published_at: Some(item.published_at),
        }
    }

    /// True when moving from `self` to `next` would go back in publish order.
    pub fn would_regress_to(&self, next: &Watermark) -> bool {
        match (self.published_at, next.published_at) {
            (Some(cur), Some(new)) => new < cur,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: ChatId,
    pub subscribed: bool,
    pub last_delivered_id: Option<String>,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl Subscriber {
    /// Fresh record, unsubscribed until the user opts in.
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            subscribed: false,
            last_delivered_id: None,
            last_delivered_at: None,
        }
    }

    pub fn watermark(&self) -> Option<Watermark> {
        self.last_delivered_id.as_ref().map(|id| Watermark {
            id: id.clone(),
            published_at: self.last_delivered_at,
        })
    }
}
