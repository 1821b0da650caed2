//! Search filters for the `/anime` and `/manga` list endpoints.

use super::error::ApiError;
use std::fmt;
use std::str::FromStr;

/// Results per page unless the caller asks otherwise
pub const DEFAULT_LIMIT: u32 = 24;

/// Declare an enum of Jikan query tokens with string conversions
macro_rules! query_token {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Token sent in the query string
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ApiError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|value| value.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        ApiError::InvalidArgument(format!(
                            "unknown {} '{}'",
                            stringify!($name),
                            s
                        ))
                    })
            }
        }
    };
}

query_token!(
    /// Anime format
    AnimeType {
        Tv => "tv",
        Movie => "movie",
        Ova => "ova",
        Special => "special",
        Ona => "ona",
        Music => "music",
    }
);

query_token!(
    /// Airing status
    AnimeStatus {
        Airing => "airing",
        Complete => "complete",
        Upcoming => "upcoming",
    }
);

query_token!(
    /// Audience rating
    AnimeRating {
        G => "g",
        Pg => "pg",
        Pg13 => "pg13",
        R17 => "r17",
        R => "r",
        Rx => "rx",
    }
);

query_token!(
    /// Manga format
    MangaType {
        Manga => "manga",
        Novel => "novel",
        LightNovel => "lightnovel",
        OneShot => "oneshot",
        Doujin => "doujin",
        Manhwa => "manhwa",
        Manhua => "manhua",
    }
);

query_token!(
    /// Publishing status
    MangaStatus {
        Publishing => "publishing",
        Complete => "complete",
        Hiatus => "hiatus",
        Discontinued => "discontinued",
        Upcoming => "upcoming",
    }
);

query_token!(
    OrderBy {
        Title => "title",
        StartDate => "start_date",
        EndDate => "end_date",
        Score => "score",
        Rank => "rank",
        Popularity => "popularity",
    }
);

query_token!(
    SortDirection {
        Desc => "desc",
        Asc => "asc",
    }
);

type Query = Vec<(&'static str, String)>;

/// Query parameters shared by both list endpoints
fn common_query(
    q: Option<&str>,
    page: u32,
    limit: u32,
    genres: &[u32],
    min_score: Option<f64>,
    order_by: Option<OrderBy>,
    sort: Option<SortDirection>,
) -> Query {
    let mut query = Query::new();

    if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
        query.push(("q", q.to_string()));
    }
    query.push(("page", page.to_string()));
    query.push(("limit", limit.to_string()));
    if !genres.is_empty() {
        let joined = genres
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        query.push(("genres", joined));
    }
    if let Some(min_score) = min_score {
        query.push(("min_score", min_score.to_string()));
    }
    if let Some(order_by) = order_by {
        query.push(("order_by", order_by.to_string()));
    }
    if let Some(sort) = sort {
        query.push(("sort", sort.to_string()));
    }

    query
}

/// Filters for `/anime`
#[derive(Debug, Clone, PartialEq)]
pub struct AnimeFilters {
    pub q: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub anime_type: Option<AnimeType>,
    pub status: Option<AnimeStatus>,
    pub rating: Option<AnimeRating>,
    /// Genre ids, all of which must match
    pub genres: Vec<u32>,
    pub min_score: Option<f64>,
    pub order_by: Option<OrderBy>,
    pub sort: Option<SortDirection>,
}

impl Default for AnimeFilters {
    fn default() -> Self {
        Self {
            q: None,
            page: 1,
            limit: DEFAULT_LIMIT,
            anime_type: None,
            status: None,
            rating: None,
            genres: Vec::new(),
            min_score: None,
            order_by: None,
            sort: None,
        }
    }
}

impl AnimeFilters {
    /// Query string pairs; unset filters are left out
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = common_query(
            self.q.as_deref(),
            self.page,
            self.limit,
            &self.genres,
            self.min_score,
            self.order_by,
            self.sort,
        );
        if let Some(anime_type) = self.anime_type {
            query.push(("type", anime_type.to_string()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.to_string()));
        }
        if let Some(rating) = self.rating {
            query.push(("rating", rating.to_string()));
        }
        query
    }

    /// Clear every filter except the page size and go back to page 1
    pub fn reset(&mut self) {
        *self = Self {
            limit: self.limit,
            ..Self::default()
        };
    }
}

/// Filters for `/manga`
#[derive(Debug, Clone, PartialEq)]
pub struct MangaFilters {
    pub q: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub manga_type: Option<MangaType>,
    pub status: Option<MangaStatus>,
    pub genres: Vec<u32>,
    pub min_score: Option<f64>,
    pub order_by: Option<OrderBy>,
    pub sort: Option<SortDirection>,
}

impl Default for MangaFilters {
    fn default() -> Self {
        Self {
            q: None,
            page: 1,
            limit: DEFAULT_LIMIT,
            manga_type: None,
            status: None,
            genres: Vec::new(),
            min_score: None,
            order_by: None,
            sort: None,
        }
    }
}

impl MangaFilters {
    /// Query string pairs; unset filters are left out
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = common_query(
            self.q.as_deref(),
            self.page,
            self.limit,
            &self.genres,
            self.min_score,
            self.order_by,
            self.sort,
        );
        if let Some(manga_type) = self.manga_type {
            query.push(("type", manga_type.to_string()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.to_string()));
        }
        query
    }

    /// Clear every filter except the page size and go back to page 1
    pub fn reset(&mut self) {
        *self = Self {
            limit: self.limit,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(query: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_query_has_only_paging() {
        let query = AnimeFilters::default().to_query();
        assert_eq!(
            query,
            vec![("page", "1".to_string()), ("limit", "24".to_string())]
        );
    }

    #[test]
    fn test_anime_query_includes_set_fields() {
        let filters = AnimeFilters {
            q: Some("  naruto ".to_string()),
            page: 2,
            anime_type: Some(AnimeType::Tv),
            rating: Some(AnimeRating::Pg13),
            genres: vec![1, 4],
            min_score: Some(7.5),
            order_by: Some(OrderBy::StartDate),
            sort: Some(SortDirection::Desc),
            ..AnimeFilters::default()
        };

        let query = filters.to_query();
        assert_eq!(value(&query, "q"), Some("naruto"));
        assert_eq!(value(&query, "page"), Some("2"));
        assert_eq!(value(&query, "type"), Some("tv"));
        assert_eq!(value(&query, "rating"), Some("pg13"));
        assert_eq!(value(&query, "genres"), Some("1,4"));
        assert_eq!(value(&query, "min_score"), Some("7.5"));
        assert_eq!(value(&query, "order_by"), Some("start_date"));
        assert_eq!(value(&query, "sort"), Some("desc"));
        assert_eq!(value(&query, "status"), None);
    }

    #[test]
    fn test_blank_search_text_is_omitted() {
        let filters = MangaFilters {
            q: Some("   ".to_string()),
            ..MangaFilters::default()
        };
        assert_eq!(value(&filters.to_query(), "q"), None);
    }

    #[test]
    fn test_reset_keeps_limit() {
        let mut anime = AnimeFilters {
            q: Some("bebop".to_string()),
            page: 5,
            limit: 10,
            status: Some(AnimeStatus::Complete),
            genres: vec![2],
            ..AnimeFilters::default()
        };
        anime.reset();
        assert_eq!(
            anime,
            AnimeFilters {
                limit: 10,
                ..AnimeFilters::default()
            }
        );

        let mut manga = MangaFilters {
            manga_type: Some(MangaType::LightNovel),
            page: 3,
            limit: 12,
            ..MangaFilters::default()
        };
        manga.reset();
        assert_eq!(manga.page, 1);
        assert_eq!(manga.limit, 12);
        assert_eq!(manga.manga_type, None);
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("TV".parse::<AnimeType>().unwrap(), AnimeType::Tv);
        assert_eq!("lightnovel".parse::<MangaType>().unwrap(), MangaType::LightNovel);
        assert_eq!("start_date".parse::<OrderBy>().unwrap(), OrderBy::StartDate);
        assert_eq!(MangaStatus::Hiatus.to_string(), "hiatus");

        let err = "weekly".parse::<AnimeStatus>().unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }
}
