//! Jikan API client routed through the shared request pipeline.

use super::error::ApiError;
use super::filters::{AnimeFilters, MangaFilters};
use super::pipeline::RequestPipeline;
use super::types::*;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::config::ApiConfig;
use shared::RateLimitState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Jikan API v4 client
///
/// Cheap to clone; clones share the HTTP connection pool and the pipeline,
/// so they are rate limited together.
#[derive(Debug, Clone)]
pub struct JikanClient {
    /// HTTP client
    client: Client,
    /// Base URL for Jikan API, without trailing slash
    base_url: String,
    pipeline: Arc<RequestPipeline>,
}

impl JikanClient {
    /// Create a client with its own pipeline built from `config`
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::with_pipeline(config, Arc::new(RequestPipeline::from_config(config)))
    }

    /// Create a client that shares an existing pipeline
    pub fn with_pipeline(
        config: &ApiConfig,
        pipeline: Arc<RequestPipeline>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// Rate limit states published by this client's pipeline
    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitState> {
        self.pipeline.subscribe()
    }

    /// Make a GET request through the pipeline
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let url = url.as_str();

        self.pipeline
            .execute_with_retry(move || self.fetch_once(url, query))
            .await
    }

    /// A single attempt, without throttling or retries
    async fn fetch_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        debug!(url = %url, "Making API request");

        let transport = |source| ApiError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            // Jikan describes most failures in a JSON body
            let message = serde_json::from_str::<JikanError>(&body)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

            warn!(url = %url, status = %status, error = %message, "Request failed");
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| {
            warn!(url = %url, error = %source, "Failed to parse response");
            ApiError::Decode {
                url: url.to_string(),
                source,
            }
        })
    }

    /// Search anime
    pub async fn search_anime(
        &self,
        filters: &AnimeFilters,
    ) -> Result<PaginatedResponse<Anime>, ApiError> {
        info!(page = filters.page, q = ?filters.q, "Searching anime");
        self.get("/anime", &filters.to_query()).await
    }

    /// Search manga
    pub async fn search_manga(
        &self,
        filters: &MangaFilters,
    ) -> Result<PaginatedResponse<Manga>, ApiError> {
        info!(page = filters.page, q = ?filters.q, "Searching manga");
        self.get("/manga", &filters.to_query()).await
    }

    /// Fetch one anime by MAL ID
    pub async fn get_anime(&self, mal_id: u32) -> Result<Anime, ApiError> {
        if mal_id == 0 {
            return Err(ApiError::InvalidArgument("invalid anime ID provided".to_string()));
        }

        debug!(mal_id = mal_id, "Fetching anime details");
        let response: DataResponse<Anime> = self.get(&format!("/anime/{}", mal_id), &[]).await?;
        Ok(response.data)
    }

    /// Fetch one manga by MAL ID
    pub async fn get_manga(&self, mal_id: u32) -> Result<Manga, ApiError> {
        if mal_id == 0 {
            return Err(ApiError::InvalidArgument("invalid manga ID provided".to_string()));
        }

        debug!(mal_id = mal_id, "Fetching manga details");
        let response: DataResponse<Manga> = self.get(&format!("/manga/{}", mal_id), &[]).await?;
        Ok(response.data)
    }

    /// Fetch all anime genres
    pub async fn anime_genres(&self) -> Result<Vec<Genre>, ApiError> {
        info!("Fetching anime genres");
        let response: DataResponse<Vec<Genre>> = self.get("/genres/anime", &[]).await?;
        Ok(response.data)
    }

    /// Fetch all manga genres
    pub async fn manga_genres(&self) -> Result<Vec<Genre>, ApiError> {
        info!("Fetching manga genres");
        let response: DataResponse<Vec<Genre>> = self.get("/genres/manga", &[]).await?;
        Ok(response.data)
    }
}
