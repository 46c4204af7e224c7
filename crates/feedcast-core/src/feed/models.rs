use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const YOUTUBE_ID_PREFIX: &str = "yt:video:";
const YOUTUBE_SHORT_LINK: &str = "https://youtu.be";

/// One entry as it comes out of the feed, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub preview_url: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A content record discovered in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable key from the source feed (the video id for YouTube)
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub preview_url: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Set once every registered channel accepted the item
    #[serde(default)]
    pub dispatched: bool,
}

impl Item {
    /// Map a raw feed entry onto the canonical shape.
    ///
    /// Entries without a usable identifier cannot be deduplicated and are
    /// dropped (`None`).
    pub fn from_raw(raw: RawEntry) -> Option<Self> {
        let id = raw.id.trim();
        let (external_id, is_youtube) = match id.strip_prefix(YOUTUBE_ID_PREFIX) {
            Some(video_id) => (video_id.trim(), true),
            None => (id, false),
        };
        if external_id.is_empty() {
            return None;
        }

        let link = if is_youtube {
            Some(format!("{}/{}", YOUTUBE_SHORT_LINK, external_id))
        } else {
            raw.link.filter(|l| !l.trim().is_empty())
        };

        Some(Item {
            external_id: external_id.to_string(),
            title: raw.title.unwrap_or_default().trim().to_string(),
            description: raw.description.unwrap_or_default().trim().to_string(),
            preview_url: raw.preview_url.filter(|u| !u.trim().is_empty()),
            link,
            published_at: raw.published_at,
            dispatched: false,
        })
    }

    /// Link placed in posts, falling back to the external id
    pub fn link_or_id(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.external_id)
    }
}
