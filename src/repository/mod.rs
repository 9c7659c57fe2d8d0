//! Analytics store for SQLite persistence.
//!
//! One repository struct owns the database file; operations are split into
//! submodules per aggregate:
//! - `schema`: database schema initialization
//! - `narratives`: the local read view of the narrative feed
//! - `prompts`: prompt version management
//! - `attempts`: extraction attempt bookkeeping
//! - `extractions`: accepted and failed extraction records
//!
//! All mutation is append-only or a single-row status transition; the
//! aggregation side only reads, so ingestion and aggregation never block each
//! other beyond SQLite's own locking (WAL mode keeps readers off the writer).

mod attempts;
mod extractions;
mod narratives;
mod prompts;
mod schema;

pub use attempts::AttemptState;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// Errors from the analytics store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown prompt version: {0}")]
    UnknownPromptVersion(String),

    #[error("No active prompt version configured")]
    NoActivePrompt,
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// SQLite-backed analytics store.
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store at the given database path.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 10000;
        "#,
        )?;
        Ok(conn)
    }

    /// Get the database path.
    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
