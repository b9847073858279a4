use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_FEED_URL: &str = "https://techcrunch.com/feed/";

/// Typed configuration, read from the environment (optionally seeded by `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub feed_url: String,

    // Poll loop
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub send_timeout: Duration,
    pub latest_cache_ttl: Duration,

    // Storage
    pub database_path: PathBuf,

    // Rendering
    pub summary_max_chars: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |key: &str| lookup(key).and_then(non_empty);
        let u64_of = |key: &str| str_of(key).and_then(|s| s.trim().parse::<u64>().ok());

        let telegram_bot_token = str_of("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let feed_url = str_of("FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        if !(feed_url.starts_with("http://") || feed_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "FEED_URL must be an http(s) url, got {feed_url}"
            )));
        }

        let poll_interval = Duration::from_secs(u64_of("POLL_INTERVAL_SECS").unwrap_or(60).max(1));
        let fetch_timeout = Duration::from_secs(u64_of("FETCH_TIMEOUT_SECS").unwrap_or(10).max(1));
        let send_timeout = Duration::from_secs(u64_of("SEND_TIMEOUT_SECS").unwrap_or(15).max(1));
        let latest_cache_ttl = Duration::from_secs(u64_of("LATEST_CACHE_TTL_SECS").unwrap_or(5));

        let database_path =
            PathBuf::from(str_of("DATABASE_PATH").unwrap_or_else(|| "news_bot.db".to_string()));

        let summary_max_chars = str_of("SUMMARY_MAX_CHARS")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(500);

        Ok(Self {
            telegram_bot_token,
            feed_url,
            poll_interval,
            fetch_timeout,
            send_timeout,
            latest_cache_ttl,
            database_path,
            summary_max_chars,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
