//! HTTP-level tests for the Jikan client against a mock server.

mod common;

use common::mock_jikan::{MockJikan, MockResponse};
use common::test_config;
use jikan_client::api::{AnimeType, MangaStatus};
use jikan_client::{AnimeFilters, ApiError, JikanClient, MangaFilters};
use reqwest::StatusCode;
use shared::RateLimitState;

const ANIME_PAGE: &str = r#"{
    "pagination": {
        "last_visible_page": 3,
        "has_next_page": true,
        "current_page": 1,
        "items": { "count": 1, "total": 51, "per_page": 24 }
    },
    "data": [{
        "mal_id": 20,
        "url": "https://myanimelist.net/anime/20/Naruto",
        "images": { "jpg": { "image_url": "https://cdn.myanimelist.net/images/anime/13/17405.jpg" } },
        "title": "Naruto",
        "type": "TV",
        "episodes": 220,
        "status": "Finished Airing",
        "score": 8.0
    }]
}"#;

const ANIME_ONE: &str = r#"{ "data": { "mal_id": 1, "title": "Cowboy Bebop", "type": "TV", "episodes": 26 } }"#;

#[tokio::test]
async fn test_search_anime_sends_filters() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server.enqueue(MockResponse::json(ANIME_PAGE)).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let filters = AnimeFilters {
        q: Some("naruto".to_string()),
        anime_type: Some(AnimeType::Tv),
        genres: vec![1, 4],
        ..AnimeFilters::default()
    };

    let page = client.search_anime(&filters).await?;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].title, "Naruto");
    assert!(page.pagination.has_next_page);

    let requests = server.captured_requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.path, "/v4/anime");
    assert!(request.has_param("q", "naruto"));
    assert!(request.has_param("page", "1"));
    assert!(request.has_param("limit", "24"));
    assert!(request.has_param("type", "tv"));
    assert!(request.has_param("genres", "1%2C4"));
    assert!(!request.query.as_deref().unwrap_or_default().contains("rating"));
    assert!(request
        .user_agent
        .as_deref()
        .is_some_and(|agent| agent.starts_with("anime-catalog/")));

    Ok(())
}

#[tokio::test]
async fn test_search_manga_uses_manga_endpoint() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server
        .enqueue(MockResponse::json(
            r#"{ "pagination": { "last_visible_page": 1, "has_next_page": false }, "data": [] }"#,
        ))
        .await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let filters = MangaFilters {
        status: Some(MangaStatus::Publishing),
        ..MangaFilters::default()
    };

    let page = client.search_manga(&filters).await?;
    assert!(page.data.is_empty());

    let requests = server.captured_requests().await;
    assert_eq!(requests[0].path, "/v4/manga");
    assert!(requests[0].has_param("status", "publishing"));

    Ok(())
}

#[tokio::test]
async fn test_get_anime_unwraps_data() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server.enqueue(MockResponse::json(ANIME_ONE)).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let anime = client.get_anime(1).await?;

    assert_eq!(anime.mal_id, 1);
    assert_eq!(anime.title, "Cowboy Bebop");
    assert_eq!(anime.episodes, Some(26));
    assert_eq!(server.captured_requests().await[0].path, "/v4/anime/1");

    Ok(())
}

#[tokio::test]
async fn test_genres_endpoints() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    let genres = r#"{ "data": [
        { "mal_id": 1, "name": "Action", "url": "https://myanimelist.net/anime/genre/1/Action", "count": 5000 },
        { "mal_id": 2, "name": "Adventure", "url": "https://myanimelist.net/anime/genre/2/Adventure", "count": 4000 }
    ] }"#;
    server.enqueue(MockResponse::json(genres)).await;
    server.enqueue(MockResponse::json(genres)).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    assert_eq!(client.anime_genres().await?.len(), 2);
    assert_eq!(client.manga_genres().await?[1].name, "Adventure");

    let paths: Vec<String> = server
        .captured_requests()
        .await
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(paths, vec!["/v4/genres/anime", "/v4/genres/manga"]);

    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server.enqueue(MockResponse::error(404, "Resource does not exist")).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let err = client.get_manga(999_999).await.unwrap_err();

    match &err {
        ApiError::Status {
            status, message, ..
        } => {
            assert_eq!(*status, StatusCode::NOT_FOUND);
            assert_eq!(message, "Resource does not exist");
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert!(err.is_not_found());
    assert_eq!(server.captured_requests().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_rate_limited_requests_are_retried() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server.enqueue(MockResponse::rate_limited()).await;
    server.enqueue(MockResponse::rate_limited()).await;
    server.enqueue(MockResponse::json(ANIME_ONE)).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let mut states = client.subscribe();

    let anime = client.get_anime(1).await?;
    assert_eq!(anime.title, "Cowboy Bebop");
    assert_eq!(server.captured_requests().await.len(), 3);

    let mut received = Vec::new();
    while let Ok(state) = states.try_recv() {
        received.push(state);
    }
    assert_eq!(received.len(), 3);
    assert!(received[0].is_limited);
    assert!(received[1].is_limited);
    assert_eq!(received[2], RateLimitState::cleared());

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_surfaces_after_retries() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    let mut config = test_config(server.base_url());
    config.retry.max_retries = 1;
    server.enqueue(MockResponse::rate_limited()).await;
    server.enqueue(MockResponse::rate_limited()).await;

    let client = JikanClient::new(&config)?;
    let err = client.get_anime(1).await.unwrap_err();

    assert!(matches!(err, ApiError::RateLimited { .. }));
    assert_eq!(server.captured_requests().await.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_invalid_id_makes_no_request() -> anyhow::Result<()> {
    let server = MockJikan::start().await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let err = client.get_anime(0).await.unwrap_err();

    assert!(matches!(err, ApiError::InvalidArgument(_)));
    assert!(server.captured_requests().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() -> anyhow::Result<()> {
    let server = MockJikan::start().await;
    server.enqueue(MockResponse::json(r#"{ "data": "#)).await;

    let client = JikanClient::new(&test_config(server.base_url()))?;
    let err = client.get_anime(5).await.unwrap_err();

    assert!(matches!(err, ApiError::Decode { .. }));
    assert_eq!(server.captured_requests().await.len(), 1);

    Ok(())
}
