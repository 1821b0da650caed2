//! Jikan API v4 response types.
//!
//! These types represent the JSON responses from the Jikan API. Jikan returns
//! `null` for many fields, so almost everything beyond the identifier and the
//! title is optional.

use serde::{Deserialize, Serialize};
use shared::CatalogEntry;

/// Generic pagination wrapper (list endpoints)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Simple data wrapper (single entities and unpaginated lists)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub last_visible_page: u32,
    pub has_next_page: bool,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub items: Option<PaginationItems>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationItems {
    pub count: u32,
    pub total: u32,
    pub per_page: u32,
}

/// Genre list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub mal_id: u32,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub count: u32,
}

/// Anime record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anime {
    pub mal_id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub images: Images,
    #[serde(default)]
    pub trailer: Option<Trailer>,

    // Titles
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,

    // Type and status
    #[serde(rename = "type")]
    pub anime_type: Option<String>,
    pub source: Option<String>,
    pub episodes: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub airing: bool,

    // Dates
    #[serde(default)]
    pub aired: Option<DateRange>,
    pub duration: Option<String>,
    pub rating: Option<String>,

    // Scores and rankings
    pub score: Option<f64>,
    pub scored_by: Option<u32>,
    pub rank: Option<u32>,
    pub popularity: Option<u32>,
    pub members: Option<u32>,
    pub favorites: Option<u32>,

    // Synopsis
    pub synopsis: Option<String>,
    pub background: Option<String>,

    // Season
    pub season: Option<String>,
    pub year: Option<u32>,

    // Studios, genres, themes, demographics
    #[serde(default)]
    pub studios: Vec<MalEntity>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub explicit_genres: Vec<MalEntity>,
    #[serde(default)]
    pub themes: Vec<MalEntity>,
    #[serde(default)]
    pub demographics: Vec<MalEntity>,
}

/// Manga record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manga {
    pub mal_id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub images: Images,

    // Titles
    pub title: String,
    pub title_english: Option<String>,
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,

    // Type and status
    #[serde(rename = "type")]
    pub manga_type: Option<String>,
    pub chapters: Option<u32>,
    pub volumes: Option<u32>,
    pub status: Option<String>,
    #[serde(default)]
    pub publishing: bool,
    #[serde(default)]
    pub published: Option<DateRange>,

    // Scores and rankings
    pub score: Option<f64>,
    pub scored_by: Option<u32>,
    pub rank: Option<u32>,
    pub popularity: Option<u32>,
    pub members: Option<u32>,
    pub favorites: Option<u32>,

    // Synopsis
    pub synopsis: Option<String>,
    pub background: Option<String>,

    // People, magazines, genres
    #[serde(default)]
    pub authors: Vec<MalEntity>,
    #[serde(default)]
    pub serializations: Vec<MalEntity>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub explicit_genres: Vec<MalEntity>,
    #[serde(default)]
    pub themes: Vec<MalEntity>,
    #[serde(default)]
    pub demographics: Vec<MalEntity>,
}

/// Cover images
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Images {
    #[serde(default)]
    pub jpg: ImageSet,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSet {
    pub image_url: Option<String>,
    pub small_image_url: Option<String>,
    pub large_image_url: Option<String>,
}

/// Trailer links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trailer {
    pub youtube_id: Option<String>,
    pub url: Option<String>,
    pub embed_url: Option<String>,
}

/// Aired / published dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Human readable range, e.g. "Apr 5, 2009 to Jul 4, 2010"
    #[serde(default)]
    pub string: Option<String>,
}

/// MAL entity (genre, studio, author, magazine, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalEntity {
    pub mal_id: u32,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    pub url: String,
}

/// Error response from Jikan API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JikanError {
    pub status: Option<u16>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl CatalogEntry for Anime {
    fn mal_id(&self) -> u32 {
        self.mal_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn image_url(&self) -> &str {
        self.images.jpg.image_url.as_deref().unwrap_or_default()
    }
}

impl CatalogEntry for Manga {
    fn mal_id(&self) -> u32 {
        self.mal_id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn image_url(&self) -> &str {
        self.images.jpg.image_url.as_deref().unwrap_or_default()
    }
}
