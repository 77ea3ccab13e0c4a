use crate::infrastructure::error::CoreError;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEY_NAMESPACE: &str = "timeflow";

pub fn categories_key(owner_id: &str) -> String {
    format!("{KEY_NAMESPACE}:categories:{owner_id}")
}

pub fn blocks_key(owner_id: &str, day: NaiveDate) -> String {
    format!("{KEY_NAMESPACE}:blocks:{owner_id}:{}", day.format("%Y-%m-%d"))
}

pub fn draft_key(owner_id: &str, day: NaiveDate) -> String {
    format!("{KEY_NAMESPACE}:draft:{owner_id}:{}", day.format("%Y-%m-%d"))
}

/// Durable shadow of the authoritative view. Reads and writes are synchronous
/// and assumed non-blocking.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLocalCache {
    entries: Mutex<HashMap<String, String>>,
}

impl LocalCache for InMemoryLocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|error| CoreError::Validation(format!("cache lock poisoned: {error}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|error| CoreError::Validation(format!("cache lock poisoned: {error}")))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|error| CoreError::Validation(format!("cache lock poisoned: {error}")))?;
        entries.remove(key);
        Ok(())
    }
}

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

#[derive(Debug, Clone)]
pub struct SqliteLocalCache {
    db_path: PathBuf,
}

impl SqliteLocalCache {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let cache = Self {
            db_path: db_path.as_ref().to_path_buf(),
        };
        cache.connect()?.execute_batch(SCHEMA_SQL)?;
        Ok(cache)
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

impl LocalCache for SqliteLocalCache {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let connection = self.connect()?;
        let value: Option<String> = connection
            .query_row("SELECT value FROM kv_cache WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_cache (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv_cache WHERE key = ?1", params![key])?;
        Ok(())
    }
}
