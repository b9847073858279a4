//! Feed adapter: HTTP retrieval (reqwest) + RSS/Atom/JSON Feed parsing (feed-rs).
//!
//! Implements the `nb-core` FeedSource port.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use nb_core::{domain::FeedItem, ports::FeedSource, FetchError};

mod parser;

pub use parser::parse_feed;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const USER_AGENT: &str = concat!("newsbot/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct HttpFeedFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(format!("http client build: {e}")))?;
        Ok(Self { http, timeout })
    }

    fn map_err(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(e.to_string())
        }
    }

    async fn download(&self, feed_url: &str) -> Result<Vec<u8>, FetchError> {
        let mut resp = self
            .http
            .get(feed_url)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        if resp
            .content_length()
            .is_some_and(|len| len > MAX_FEED_SIZE as u64)
        {
            return Err(FetchError::TooLarge {
                limit: MAX_FEED_SIZE,
            });
        }

        // Content-Length may be absent or wrong; enforce the limit while reading.
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| self.map_err(e))? {
            if body.len() + chunk.len() > MAX_FEED_SIZE {
                return Err(FetchError::TooLarge {
                    limit: MAX_FEED_SIZE,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl FeedSource for HttpFeedFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, FetchError> {
        let body = tokio::time::timeout(self.timeout, self.download(feed_url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        let items = parse_feed(&body, Utc::now())?;
        tracing::debug!(feed = %feed_url, bytes = body.len(), items = items.len(), "feed fetched");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>https://e.x/</link><description>d</description>
  <item><title>One</title><link>https://e.x/1</link><guid>g1</guid><pubDate>Tue, 29 Sep 2026 10:00:00 +0000</pubDate></item>
  <item><title>Two</title><link>https://e.x/2</link><guid>g2</guid><pubDate>Wed, 30 Sep 2026 10:00:00 +0000</pubDate></item>
</channel></rss>"#;

    fn fetcher() -> HttpFeedFetcher {
        HttpFeedFetcher::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_orders_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let items = fetcher()
            .fetch(&format!("{}/feed", server.uri()))
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn garbage_body_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{ not json"))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFeedFetcher::new(Duration::from_millis(200)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let err = fetcher()
            .fetch("http://127.0.0.1:9/feed")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout(_)));
    }
}
