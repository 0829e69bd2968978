//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// No campaign with this id.
    #[error("Campaign '{0}' not found")]
    NotFound(String),

    /// A partial update named a column that may not be written.
    #[error("Column '{0}' cannot be updated")]
    InvalidColumn(String),

    /// A stored column could not be decoded.
    #[error("Corrupt value in column '{column}': {reason}")]
    Corrupt { column: &'static str, reason: String },

    /// The tags column could not be encoded.
    #[error("Failed to encode tags: {0}")]
    Encode(#[from] serde_json::Error),
}
