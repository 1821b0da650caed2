//! Database operations for SQLite.
//!
//! This module owns the SQLite connection backing durable key/value storage:
//! schema creation, migrations and the row-level operations used by
//! [`crate::storage::SqliteStorage`].

use crate::storage::StorageError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Current schema version (stored in `PRAGMA user_version`)
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    revision INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS kv_sequence (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL
);
INSERT OR IGNORE INTO kv_sequence (id, value) VALUES (1, 0);
";

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        debug!(path = %path.display(), "Opening database");

        let conn = Connection::open(path)?;

        // Several processes share the file; wait for their locks instead of failing
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

        let mut db = Self { conn };

        if db.get_version()? == 0 {
            info!(path = %path.display(), "Creating new database schema");
            db.create_schema()?;
        } else {
            db.run_migrations()?;
        }

        Ok(db)
    }

    /// Create the database schema
    fn create_schema(&mut self) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;

        info!(version = SCHEMA_VERSION, "Database schema created successfully");
        Ok(())
    }

    /// Run migrations for existing databases
    fn run_migrations(&mut self) -> Result<(), StorageError> {
        let version = self.get_version()?;
        if version > SCHEMA_VERSION {
            return Err(StorageError::Unavailable(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        debug!(version = version, "Database already exists");
        Ok(())
    }

    /// Get the database version (from user_version pragma)
    pub fn get_version(&self) -> Result<i32, StorageError> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Counter that changes whenever another connection commits
    ///
    /// Commits made through this connection leave it unchanged.
    pub fn data_version(&self) -> Result<i64, StorageError> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Read the value stored under `key`
    pub fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace the value under `key`, returning its new revision
    pub fn put_value(&mut self, key: &str, value: &str) -> Result<i64, StorageError> {
        let tx = self.conn.transaction()?;

        let revision: i64 = tx.query_row(
            "UPDATE kv_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO kv_store (key, value, revision, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 revision = excluded.revision,
                 updated_at = excluded.updated_at",
            params![key, value, revision, Utc::now().timestamp_millis()],
        )?;

        tx.commit()?;

        debug!(key = key, revision = revision, bytes = value.len(), "Stored value");
        Ok(revision)
    }

    /// Delete the value under `key`, returning whether it existed
    pub fn delete_value(&self, key: &str) -> Result<bool, StorageError> {
        let deleted = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    /// Delete every stored value
    pub fn delete_all(&self) -> Result<usize, StorageError> {
        let deleted = self.conn.execute("DELETE FROM kv_store", [])?;
        Ok(deleted)
    }

    /// Current revision of every stored key
    pub fn revisions(&self) -> Result<HashMap<String, i64>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT key, revision FROM kv_store")?;

        let revisions = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(revisions)
    }
}
