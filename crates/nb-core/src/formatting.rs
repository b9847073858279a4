use std::sync::OnceLock;

use regex::Regex;

use crate::domain::FeedItem;

/// Escape HTML special characters for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Drop markup from a feed summary and collapse whitespace.
///
/// Summaries arrive as arbitrary HTML; Telegram only accepts a tiny subset,
/// so everything is flattened to text and re-escaped by the caller.
pub fn strip_tags(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

    let text = tag.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", s.chars().take(keep).collect::<String>())
}

/// Telegram rejects messages longer than this.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const MAX_TITLE_CHARS: usize = 256;
const MAX_AUTHOR_CHARS: usize = 128;
const MAX_LINK_CHARS: usize = 2048;

/// Render one item as a Telegram HTML message.
///
/// Layout: bold title, link, italic author, publish time, summary. Empty parts
/// are skipped. The message stays within `MAX_MESSAGE_CHARS` so a single
/// oversized entry cannot fail on every tick; the summary gets whatever room
/// the other parts leave.
pub fn format_item_html(item: &FeedItem, summary_max_chars: usize) -> String {
    let title = match item.title.trim() {
        "" => "No title".to_string(),
        t => escape_html(&truncate_chars(t, MAX_TITLE_CHARS)),
    };

    // An overlong URL would be cut mid-way; leave it out instead.
    let link = match item.link.trim() {
        l if l.is_empty() || l.chars().count() > MAX_LINK_CHARS => String::new(),
        l => format!("<a href=\"{}\">Read on site</a>", escape_html(l)),
    };

    let author = item
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| truncate_chars(a, MAX_AUTHOR_CHARS))
        .unwrap_or_else(|| "Unknown".to_string());

    let published = item.published_at.format("%Y-%m-%d %H:%M UTC").to_string();

    let head = [
        format!("<b>{title}</b>"),
        link,
        format!("<i>{}</i>", escape_html(&author)),
        published,
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    // One char for the separating newline.
    let room = MAX_MESSAGE_CHARS
        .saturating_sub(head.chars().count() + 1)
        .min(summary_max_chars);

    let summary = item
        .summary
        .as_deref()
        .map(strip_tags)
        .filter(|s| !s.is_empty() && room > 3)
        .map(|s| escape_html(&truncate_chars(&s, room)));

    match summary {
        Some(summary) => format!("{head}\n{summary}"),
        None => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item() -> FeedItem {
        FeedItem {
            id: "1".into(),
            title: "Rust & <friends>".into(),
            link: "https://example.com/a?x=1&y=2".into(),
            published_at: Utc.with_ymd_and_hms(2026, 5, 4, 13, 7, 0).unwrap(),
            author: Some("Ada".into()),
            summary: Some("<p>Hello <b>world</b></p>".into()),
        }
    }

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn strips_markup_and_entities() {
        assert_eq!(
            strip_tags("<p>a&nbsp;b</p>\n<div>c &amp; d</div>"),
            "a b c & d"
        );
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("ééééééé", 5), "éé...");
    }

    #[test]
    fn renders_full_item() {
        let html = format_item_html(&item(), 500);
        assert_eq!(
            html,
            "<b>Rust &amp; &lt;friends&gt;</b>\n\
             <a href=\"https://example.com/a?x=1&amp;y=2\">Read on site</a>\n\
             <i>Ada</i>\n\
             2026-05-04 13:07 UTC\n\
             Hello world"
        );
    }

    #[test]
    fn missing_parts_are_omitted() {
        let mut it = item();
        it.link.clear();
        it.author = None;
        it.summary = None;
        let html = format_item_html(&it, 500);
        assert!(!html.contains("Read on site"));
        assert!(html.contains("<i>Unknown</i>"));
        assert_eq!(html.lines().count(), 3);
    }

    #[test]
    fn oversized_item_fits_in_one_message() {
        let mut it = item();
        it.title = "t".repeat(10_000);
        it.author = Some("a".repeat(1_000));
        it.summary = Some("s".repeat(10_000));

        let html = format_item_html(&it, 10_000);

        assert!(html.chars().count() <= MAX_MESSAGE_CHARS);
        assert!(html.contains("Read on site"));
        assert!(html.ends_with("..."));
        let title = html.lines().next().unwrap();
        assert_eq!(title.chars().count(), "<b></b>".len() + 256);
    }

    #[test]
    fn long_summary_is_truncated() {
        let mut it = item();
        it.summary = Some("x".repeat(600));
        let html = format_item_html(&it, 500);
        let last = html.lines().last().unwrap();
        assert_eq!(last.chars().count(), 500);
        assert!(last.ends_with("..."));
    }
}
