//! Shared library for the anime/manga catalog workspace.
//!
//! This crate provides common functionality used by the API client, the
//! wishlist store and the command-line front end:
//! - Configuration management
//! - Logging infrastructure
//! - Data model (wishlist items, media kinds, rate limit state)
//! - Durable key/value storage with cross-context change feeds
//! - File path utilities

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod paths;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use logging::LogConfig;
pub use models::*;
pub use paths::DataPaths;
pub use storage::{ChangeFeed, KeyValueStorage, MemoryStorage, SqliteStorage, StorageError, StorageEvent};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
