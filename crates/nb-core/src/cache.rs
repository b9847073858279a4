use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::{domain::FeedItem, errors::FetchError, ports::FeedSource};

struct Entry {
    url: String,
    items: Vec<FeedItem>,
    fetched_at: Instant,
}

/// FeedSource decorator that reuses the last successful fetch for a short TTL.
///
/// Serves `/latest`, where many users may ask within seconds of each other. On
/// a failed refresh the previous (stale) result is returned if one exists.
/// The poll loop does not go through this cache.
pub struct CachedFeed {
    inner: Arc<dyn FeedSource>,
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl CachedFeed {
    pub fn new(inner: Arc<dyn FeedSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entry: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FeedSource for CachedFeed {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, FetchError> {
        // Held across the fetch so concurrent callers share one request.
        let mut entry = self.entry.lock().await;

        if let Some(e) = entry.as_ref() {
            if e.url == feed_url && e.fetched_at.elapsed() < self.ttl {
                return Ok(e.items.clone());
            }
        }

        match self.inner.fetch(feed_url).await {
            Ok(items) => {
                *entry = Some(Entry {
                    url: feed_url.to_string(),
                    items: items.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(items)
            }
            Err(err) => match entry.as_ref().filter(|e| e.url == feed_url) {
                Some(stale) => {
                    tracing::warn!(
                        feed = %feed_url,
                        error = %err,
                        age_secs = stale.fetched_at.elapsed().as_secs(),
                        "feed refresh failed, serving cached items"
                    );
                    Ok(stale.items.clone())
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{item, FakeFeed};

    const URL: &str = "https://example.com/feed";

    #[tokio::test(start_paused = true)]
    async fn reuses_fresh_result_within_ttl() {
        let feed = Arc::new(FakeFeed::with_items(vec![item("a", 1)]));
        let cache = CachedFeed::new(feed.clone(), Duration::from_secs(5));

        cache.fetch(URL).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.fetch(URL).await.unwrap();
        assert_eq!(feed.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.fetch(URL).await.unwrap();
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn serves_stale_items_when_refresh_fails() {
        let feed = Arc::new(FakeFeed::with_items(vec![item("a", 1)]));
        let cache = CachedFeed::new(feed.clone(), Duration::from_secs(5));
        cache.fetch(URL).await.unwrap();

        feed.fail_with(FetchError::HttpStatus(503));
        tokio::time::advance(Duration::from_secs(10)).await;

        let items = cache.fetch(URL).await.unwrap();
        assert_eq!(items[0].id, "a");
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test]
    async fn propagates_error_without_cached_value() {
        let feed = Arc::new(FakeFeed::with_items(vec![]));
        feed.fail_with(FetchError::Parse("bad xml".into()));
        let cache = CachedFeed::new(feed, Duration::from_secs(5));

        assert!(matches!(
            cache.fetch(URL).await,
            Err(FetchError::Parse(_))
        ));
    }
}
