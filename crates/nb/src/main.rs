use std::sync::Arc;

use nb_core::{config::Config, ports::FeedSource, ports::SubscriberStore};
use nb_feed::HttpFeedFetcher;
use nb_sqlite::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nb_core::logging::init("nb")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn SubscriberStore> = Arc::new(SqliteStore::open(&cfg.database_path).await?);
    let feed: Arc<dyn FeedSource> = Arc::new(HttpFeedFetcher::new(cfg.fetch_timeout)?);

    tracing::info!(
        db = %cfg.database_path.display(),
        interval_secs = cfg.poll_interval.as_secs(),
        "starting news bot"
    );

    nb_telegram::router::run_polling(cfg, store, feed).await
}
