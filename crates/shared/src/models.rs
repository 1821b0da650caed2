//! Data models for the project.
//!
//! This module defines the data structures shared between the API client and
//! the wishlist store: media kinds, wishlist entries and the transient rate
//! limit state broadcast by the request pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Media namespace of a catalog entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Anime,
    Manga,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Anime => "anime",
            MediaKind::Manga => "manga",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anime" => Ok(MediaKind::Anime),
            "manga" => Ok(MediaKind::Manga),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Anything that can be saved to the wishlist.
///
/// Implemented by the anime and manga records returned by the catalog API.
pub trait CatalogEntry {
    /// MyAnimeList identifier
    fn mal_id(&self) -> u32;
    /// Display title
    fn title(&self) -> &str;
    /// Cover image URL (empty when the source has none)
    fn image_url(&self) -> &str;
}

/// Saved wishlist entry
///
/// `title` and `image` are snapshots taken when the entry was added; they are
/// not kept in sync with the catalog afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WishlistItem {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub title: String,
    pub image: String,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "addedAt")]
    pub added_at: i64,
}

impl WishlistItem {
    /// Project a catalog entry into a wishlist item stamped with the current time
    pub fn from_entry(entry: &impl CatalogEntry, kind: MediaKind) -> Self {
        Self {
            id: entry.mal_id(),
            kind,
            title: entry.title().to_string(),
            image: entry.image_url().to_string(),
            added_at: Utc::now().timestamp_millis(),
        }
    }

    /// Whether this item is the entry identified by `(id, kind)`
    pub fn matches(&self, id: u32, kind: MediaKind) -> bool {
        self.id == id && self.kind == kind
    }
}

/// Wishlist totals per media kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WishlistCounts {
    pub total: usize,
    pub anime: usize,
    pub manga: usize,
}

/// Rate limit notification payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub is_limited: bool,
    pub retry_in_seconds: u64,
}

impl RateLimitState {
    /// Requests are flowing normally
    pub fn cleared() -> Self {
        Self {
            is_limited: false,
            retry_in_seconds: 0,
        }
    }

    /// Upstream rejected a request; the next attempt happens after `delay`
    pub fn limited(delay: Duration) -> Self {
        Self {
            is_limited: true,
            retry_in_seconds: delay.as_millis().div_ceil(1000) as u64,
        }
    }
}
