//! Shared application state for the HTTP layer.
//!
//! Holds the database location only. Every request opens its own
//! connection, so no store handle is shared across requests.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::db;

pub struct CoreState {
    db_path: PathBuf,
    started_at: Instant,
}

impl CoreState {
    /// State backed by an existing, migrated database file.
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            started_at: Instant::now(),
        }
    }

    /// Open a database connection for one request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}
