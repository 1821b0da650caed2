//! Shared test utilities for HTTP-level client tests.

#![allow(dead_code, unused_imports)]

pub mod mock_jikan;

use shared::config::ApiConfig;

/// Client settings pointed at a mock server, with test-sized delays
pub fn test_config(base_url: String) -> ApiConfig {
    let mut config = ApiConfig::default();
    config.base_url = base_url;
    config.timeout_seconds = 5;
    config.rate_limit.min_interval_ms = 10;
    config.rate_limit.requests_per_minute = None;
    config.retry.initial_delay_ms = 20;
    config
}
