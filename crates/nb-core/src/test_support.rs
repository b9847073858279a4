//! Port fakes shared by the unit tests in this crate.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    domain::{ChatId, FeedItem, MessageId, MessageRef, Subscriber, Watermark},
    errors::{DispatchError, Error, FetchError, StorageError},
    messaging::{
        port::MessagingPort,
        types::InlineKeyboard,
    },
    ports::{FeedSource, SubscriberStore},
    Result,
};

/// Item published on 2026-01-01 at `hour`:00 UTC.
pub fn item(id: &str, hour: u32) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        title: format!("Title {id}"),
        link: format!("https://example.com/{id}"),
        published_at: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
        author: None,
        summary: None,
    }
}

#[derive(Default)]
pub struct FakeFeed {
    items: Mutex<Vec<FeedItem>>,
    error: Mutex<Option<FetchError>>,
    calls: AtomicUsize,
}

impl FakeFeed {
    pub fn with_items(items: Vec<FeedItem>) -> Self {
        let feed = Self::default();
        feed.set_items(items);
        feed
    }

    pub fn set_items(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
        *self.error.lock().unwrap() = None;
    }

    pub fn fail_with(&self, err: FetchError) {
        *self.error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch(&self, _feed_url: &str) -> std::result::Result<Vec<FeedItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    answers: Mutex<Vec<(String, Option<String>)>>,
    // chat -> (sends allowed before failing, error returned afterwards)
    failures: Mutex<HashMap<ChatId, (usize, DispatchError)>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    fn check(&self, chat_id: ChatId) -> Result<()> {
        let failures = self.failures.lock().unwrap();
        match failures.get(&chat_id) {
            Some((allowed, err)) if self.sent_to(chat_id).len() >= *allowed => {
                Err(Error::Dispatch(err.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn block(&self, chat_id: ChatId) {
        self.fail_after(chat_id, 0, DispatchError::Blocked(chat_id.0));
    }

    /// Let `allowed` messages through to `chat_id`, then fail with `err`.
    pub fn fail_after(&self, chat_id: ChatId, allowed: usize, err: DispatchError) {
        self.failures.lock().unwrap().insert(chat_id, (allowed, err));
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, html)| html.clone())
            .collect()
    }

    pub fn total_sends(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    pub fn keyboards(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>)> {
        self.answers.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.check(chat_id)?;
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.check(msg.chat_id)?;
        self.edits.lock().unwrap().push((msg, html.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.check(chat_id)?;
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, html.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

/// Store whose every call fails.
pub struct BrokenStore;

fn broken() -> StorageError {
    StorageError::Database("disk I/O error".to_string())
}

#[async_trait]
impl SubscriberStore for BrokenStore {
    async fn get(&self, _chat_id: ChatId) -> std::result::Result<Option<Subscriber>, StorageError> {
        Err(broken())
    }

    async fn get_or_create(&self, _chat_id: ChatId) -> std::result::Result<Subscriber, StorageError> {
        Err(broken())
    }

    async fn set_subscribed(
        &self,
        _chat_id: ChatId,
        _subscribed: bool,
    ) -> std::result::Result<(), StorageError> {
        Err(broken())
    }

    async fn list_subscribed(&self) -> std::result::Result<BTreeSet<ChatId>, StorageError> {
        Err(broken())
    }

    async fn get_last_delivered(
        &self,
        _chat_id: ChatId,
    ) -> std::result::Result<Option<Watermark>, StorageError> {
        Err(broken())
    }

    async fn set_last_delivered(
        &self,
        _chat_id: ChatId,
        _watermark: &Watermark,
    ) -> std::result::Result<(), StorageError> {
        Err(broken())
    }
}
