//! SQLite store for compendium records.
//!
//! A single connection behind a mutex; ingestions running concurrently
//! coordinate through the primary key on `compendia.id` only.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod compendium_repo;
pub mod error;
pub mod migrations;

pub use compendium_repo::CompendiumRow;
pub use error::DatabaseError;

/// Shared handle to the compendium store. Clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the store at `path`, creating parent directories, and
    /// migrates it to the latest schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| DatabaseError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::run_all(&mut conn)?;

        log::info!(
            "Compendium store ready at {} (schema v{})",
            path.display(),
            migrations::latest_version()
        );
        Ok(Self::wrap(conn))
    }

    /// Migrated in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_all(&mut conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }
}
