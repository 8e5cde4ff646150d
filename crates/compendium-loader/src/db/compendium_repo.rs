//! Compendium repository: write-once records for the `compendia` table.

use rusqlite::{params, Row};
use serde_json::Value;

use super::{Database, DatabaseError};

/// A compendium record.
#[derive(Debug, Clone, PartialEq)]
pub struct CompendiumRow {
    pub id: String,
    pub owner: String,
    pub candidate: bool,
    pub bag: bool,
    pub compendium: bool,
    pub metadata: Value,
    /// Random token the payload was extracted under, when a declared id
    /// replaced it.
    pub upload_id: Option<String>,
    pub created_at: String,
}

impl CompendiumRow {
    /// A candidate record with empty metadata, created now.
    pub fn new(id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            candidate: true,
            bag: false,
            compendium: false,
            metadata: Value::Object(serde_json::Map::new()),
            upload_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let metadata: String = row.get("metadata")?;
        let metadata = serde_json::from_str(&metadata).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self {
            id: row.get("id")?,
            owner: row.get("owner")?,
            candidate: row.get("candidate")?,
            bag: row.get("bag")?,
            compendium: row.get("compendium")?,
            metadata,
            upload_id: row.get("upload_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

/// Inserts a new record in a single statement.
///
/// An existing record with the same id yields [`DatabaseError::Duplicate`].
pub fn insert(db: &Database, row: &CompendiumRow) -> Result<(), DatabaseError> {
    let metadata = serde_json::to_string(&row.metadata)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO compendia (id, owner, candidate, bag, compendium, metadata, upload_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.owner,
                row.candidate,
                row.bag,
                row.compendium,
                metadata,
                row.upload_id,
                row.created_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::Duplicate { id: row.id.clone() }
            } else {
                DatabaseError::Sqlite(e)
            }
        })?;
        Ok(())
    })
}

/// Finds a record by its id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<CompendiumRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM compendia WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], CompendiumRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
