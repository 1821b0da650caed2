//! Rate-limited client for the Jikan API (unofficial MyAnimeList API).
//!
//! Every request goes through a shared [`RequestPipeline`] that spaces
//! dispatches to respect Jikan's rate limit, retries HTTP 429 responses with
//! exponential backoff, and broadcasts [`shared::RateLimitState`] updates so a
//! front end can show a "rate limited" indicator.

pub mod api;

pub use api::{
    AnimeFilters, ApiError, JikanClient, MangaFilters, RateLimiter, RequestPipeline, RetryPolicy,
    RetryableError,
};
