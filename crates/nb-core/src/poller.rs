//! Poll loop: fetch, diff against each subscriber's watermark, dispatch,
//! advance the watermark.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    dispatch::Dispatcher,
    domain::{ChatId, FeedItem, Watermark},
    errors::{DispatchError, StorageError},
    locks::ChatLocks,
    ports::{FeedSource, SubscriberStore},
    Result,
};

/// Items a subscriber has not seen yet, oldest first.
///
/// `items` must be newest first. Without a watermark only the newest item
/// counts as new, so a fresh subscriber is not flooded with history. When the
/// watermark id has dropped out of the feed, its timestamp decides.
pub fn new_items<'a>(items: &'a [FeedItem], watermark: Option<&Watermark>) -> Vec<&'a FeedItem> {
    let Some(mark) = watermark else {
        return items.first().into_iter().collect();
    };

    let newer: Vec<&FeedItem> = match items.iter().position(|it| it.id == mark.id) {
        Some(pos) => items[..pos].iter().collect(),
        None => match mark.published_at {
            Some(at) => items.iter().filter(|it| it.published_at > at).collect(),
            None => items.first().into_iter().collect(),
        },
    };

    newer.into_iter().rev().collect()
}

#[derive(Debug)]
pub enum SubscriberFailure {
    Dispatch(DispatchError),
    Storage(StorageError),
}

impl std::fmt::Display for SubscriberFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberFailure::Dispatch(e) => write!(f, "{e}"),
            SubscriberFailure::Storage(e) => write!(f, "{e}"),
        }
    }
}

/// What happened to one subscriber during a tick.
#[derive(Debug)]
pub enum SubscriberOutcome {
    /// Nothing newer than the watermark.
    UpToDate,
    /// `count` items sent; the watermark now points at `watermark`.
    Delivered { count: usize, watermark: String },
    /// Stopped after `delivered` items. The watermark covers exactly those.
    Failed {
        delivered: usize,
        error: SubscriberFailure,
    },
    /// Unsubscribed between listing and locking.
    Skipped,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub fetched: usize,
    pub outcomes: Vec<(ChatId, SubscriberOutcome)>,
}

impl TickReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                SubscriberOutcome::Delivered { count, .. } => *count,
                SubscriberOutcome::Failed { delivered, .. } => *delivered,
                _ => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SubscriberOutcome::Failed { .. }))
            .count()
    }
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    feed_url: String,
    interval: Duration,
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn SubscriberStore>,
    dispatcher: Dispatcher,
    locks: Arc<ChatLocks>,
}

impl Poller {
    pub fn new(
        feed_url: impl Into<String>,
        interval: Duration,
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn SubscriberStore>,
        dispatcher: Dispatcher,
        locks: Arc<ChatLocks>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                feed_url: feed_url.into(),
                interval,
                feed,
                store,
                dispatcher,
                locks,
            }),
        }
    }

    /// One fetch-diff-dispatch cycle.
    ///
    /// Errors only when nothing could be attempted (feed or subscriber list
    /// unavailable); per-subscriber failures are reported in the outcome list.
    pub async fn tick(&self) -> Result<TickReport> {
        let items = self.inner.feed.fetch(&self.inner.feed_url).await?;
        let mut report = TickReport {
            fetched: items.len(),
            outcomes: Vec::new(),
        };
        if items.is_empty() {
            return Ok(report);
        }

        let subscribers = self.inner.store.list_subscribed().await?;
        for chat_id in subscribers {
            let outcome = self.deliver_to(chat_id, &items).await;
            if let SubscriberOutcome::Failed { delivered, error } = &outcome {
                tracing::warn!(
                    chat_id = chat_id.0,
                    delivered = *delivered,
                    error = %error,
                    "delivery to subscriber failed"
                );
            }
            report.outcomes.push((chat_id, outcome));
        }

        Ok(report)
    }

    async fn deliver_to(&self, chat_id: ChatId, items: &[FeedItem]) -> SubscriberOutcome {
        let _guard = self.inner.locks.lock_chat(chat_id).await;
        let store = &self.inner.store;

        match store.get(chat_id).await {
            Ok(Some(sub)) if sub.subscribed => {}
            Ok(_) => return SubscriberOutcome::Skipped,
            Err(e) => {
                return SubscriberOutcome::Failed {
                    delivered: 0,
                    error: SubscriberFailure::Storage(e),
                }
            }
        }

        let watermark = match store.get_last_delivered(chat_id).await {
            Ok(w) => w,
            Err(e) => {
                return SubscriberOutcome::Failed {
                    delivered: 0,
                    error: SubscriberFailure::Storage(e),
                }
            }
        };

        let fresh = new_items(items, watermark.as_ref());
        let Some(newest) = fresh.last().map(|it| it.id.clone()) else {
            return SubscriberOutcome::UpToDate;
        };

        let mut delivered = 0usize;
        for item in fresh {
            if let Err(e) = self.inner.dispatcher.deliver(chat_id, item).await {
                return SubscriberOutcome::Failed {
                    delivered,
                    error: SubscriberFailure::Dispatch(e),
                };
            }
            delivered += 1;

            // Advance after every send so a later failure never causes a resend.
            if let Err(e) = store.set_last_delivered(chat_id, &Watermark::of(item)).await {
                tracing::error!(
                    chat_id = chat_id.0,
                    item = %item.id,
                    error = %e,
                    "sent item but could not persist watermark"
                );
                return SubscriberOutcome::Failed {
                    delivered,
                    error: SubscriberFailure::Storage(e),
                };
            }
        }

        SubscriberOutcome::Delivered {
            count: delivered,
            watermark: newest,
        }
    }

    /// Tick every `interval` until `cancel` fires. Failed ticks are logged and
    /// retried on the next interval.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            feed = %self.inner.feed_url,
            interval_secs = self.inner.interval.as_secs(),
            "poll loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(report) => {
                    if report.delivered() > 0 || report.failed() > 0 {
                        tracing::info!(
                            fetched = report.fetched,
                            subscribers = report.outcomes.len(),
                            delivered = report.delivered(),
                            failed = report.failed(),
                            "poll tick finished"
                        );
                    } else {
                        tracing::debug!(fetched = report.fetched, "poll tick: nothing new");
                    }
                }
                Err(e) => tracing::warn!(feed = %self.inner.feed_url, error = %e, "poll tick skipped"),
            }
        }

        tracing::info!("poll loop stopped");
    }

    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    }
}
