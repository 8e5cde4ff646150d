use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Insert hit an existing primary key.
    #[error("Compendium '{id}' is already recorded")]
    Duplicate { id: String },

    #[error("Metadata column is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot prepare database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
