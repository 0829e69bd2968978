//! SQLite storage for campaign drafts.
//!
//! One connection per [`Database`]; clones share it behind a mutex, so
//! statements from the workflow task and the caller never interleave.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod campaign_repo;
pub mod error;
pub mod migrations;

pub use error::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the campaign database at `path`, creating the file and its
    /// directory if needed, and applies pending schema steps.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::apply_pending(&mut conn)?;

        log::info!(
            "Campaign database ready at {} (schema v{})",
            path.display(),
            migrations::latest_version()
        );
        Ok(Self::from_connection(conn))
    }

    /// A private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::apply_pending(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }

    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::current_version)
    }
}

/// `~/.campaign-assist/data/campaigns.db`, or `None` without a home directory.
pub fn default_database_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.extend([".campaign-assist", "data", "campaigns.db"]);
    Some(path)
}
