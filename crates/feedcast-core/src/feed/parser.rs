use chrono::{DateTime, Utc};
use feed_rs::parser;

use super::models::RawEntry;
use crate::{Error, Result};

/// Parse RSS/Atom content into raw entries.
///
/// YouTube uploads feeds carry the description and thumbnail inside
/// `media:group`; plain feeds fall back to summary/content.
pub fn parse_feed(content: &[u8]) -> Result<Vec<RawEntry>> {
    let feed = parser::parse(content)
        .map_err(|e| Error::FeedFetch(format!("Failed to parse feed: {}", e)))?;

    let entries = feed.entries.into_iter().map(|entry| {
        let media = entry.media.first();

        let description = media
            .and_then(|m| m.description.as_ref())
            .map(|d| d.content.clone())
            .or_else(|| entry.summary.as_ref().map(|s| html_to_text(&s.content)))
            .or_else(|| {
                entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.as_deref())
                    .map(html_to_text)
            });

        let preview_url = media
            .and_then(|m| m.thumbnails.first())
            .map(|t| t.image.uri.clone())
            .or_else(|| {
                media
                    .and_then(|m| m.content.first())
                    .and_then(|c| c.url.as_ref())
                    .map(|u| u.to_string())
            });

        let title = entry
            .title
            .map(|t| t.content)
            .or_else(|| media.and_then(|m| m.title.as_ref()).map(|t| t.content.clone()));

        RawEntry {
            id: entry.id,
            title,
            description,
            preview_url,
            link: entry.links.first().map(|l| l.href.clone()),
            published_at: entry.published.or(entry.updated).map(DateTime::<Utc>::from),
        }
    }).collect();

    Ok(entries)
}

/// Convert HTML content to plain text
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80)
        .unwrap_or_else(|_| html.to_string())
}
