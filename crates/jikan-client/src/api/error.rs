//! Error types for Jikan API calls.

use super::pipeline::RetryableError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`super::JikanClient`]
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP 429; retried by the pipeline until its retry budget runs out
    #[error("Rate limited by server (HTTP 429): {url}")]
    RateLimited { url: String },

    /// Any other non-success HTTP status, including 404
    #[error("Request failed with status {status}: {message} ({url})")]
    Status {
        url: String,
        status: StatusCode,
        message: String,
    },

    #[error("Request error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Rejected before any request was made
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl RetryableError for ApiError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_429_is_retryable() {
        let limited = ApiError::RateLimited {
            url: "https://api.jikan.moe/v4/anime".to_string(),
        };
        let missing = ApiError::Status {
            url: "https://api.jikan.moe/v4/anime/0".to_string(),
            status: StatusCode::NOT_FOUND,
            message: "Resource does not exist".to_string(),
        };

        assert!(limited.is_rate_limited());
        assert_eq!(limited.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert!(!missing.is_rate_limited());
        assert!(missing.is_not_found());
        assert!(!ApiError::InvalidArgument("id".to_string()).is_rate_limited());
    }

    #[test]
    fn test_display() {
        let err = ApiError::Status {
            url: "https://api.jikan.moe/v4/manga/1".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "upstream down".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Request failed with status 500 Internal Server Error: upstream down (https://api.jikan.moe/v4/manga/1)"
        );
    }
}
