use chrono::{DateTime, Utc};
use feed_rs::{
    model::{Link, Text},
    parser,
};
use sha2::{Digest, Sha256};

use nb_core::{domain::FeedItem, FetchError};

/// Parse an RSS, Atom or JSON Feed document into items, newest first.
///
/// Undated entries are stamped with `fetched_at`. The sort is stable, so a
/// feed that is already reverse-chronological keeps its order.
pub fn parse_feed(bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<Vec<FeedItem>, FetchError> {
    let feed = parser::Builder::new()
        .id_generator(synthesize_id)
        .build()
        .parse(bytes)
        .map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut items: Vec<FeedItem> = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = preferred_link(&entry.links).unwrap_or_default().to_string();
            let dated = entry.published.or(entry.updated);
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .unwrap_or_default();
            let author = entry
                .authors
                .into_iter()
                .map(|p| p.name)
                .find(|n| !n.trim().is_empty());
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .filter(|s| !s.trim().is_empty());

            FeedItem {
                id: entry.id.trim().to_string(),
                title,
                link,
                published_at: dated.unwrap_or(fetched_at),
                author,
                summary,
            }
        })
        .collect();

    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    dedup_by_id(&mut items);
    Ok(items)
}

fn preferred_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.trim())
}

/// Id for entries the feed leaves without one: a digest of link and title.
///
/// feed-rs falls back to a random UUID when an entry has neither guid nor
/// link, which would make the same entry look new on every fetch.
fn synthesize_id(links: &[Link], title: &Option<Text>, _base: Option<&str>) -> String {
    let link = preferred_link(links).unwrap_or_default();
    let title = title.as_ref().map(|t| t.content.trim()).unwrap_or_default();
    format!("{:x}", Sha256::digest(format!("{link}|{title}").as_bytes()))
}

// Keep the first (newest) occurrence of each id.
fn dedup_by_id(items: &mut Vec<FeedItem>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|it| seen.insert(it.id.clone()));
}
