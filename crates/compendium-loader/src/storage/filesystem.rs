use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::StorageError;

/// Move a directory from `src` to `dst`. Uses `rename` first (atomic on the
/// same filesystem) and falls back to a recursive copy followed by removal of
/// the source for cross-device moves.
fn move_dir(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let move_err = |source: std::io::Error| StorageError::Move {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    };

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| StorageError::Scan {
            path: src.to_path_buf(),
            source: e,
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(move_err)?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(move_err)?;
        }
    }

    std::fs::remove_dir_all(src).map_err(move_err)?;
    Ok(())
}

/// Recursively deletes `path`. Missing paths are a no-op.
///
/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool, StorageError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Deletes a single file. Missing paths are a no-op.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Result of moving a payload to its canonical location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub destination: PathBuf,
    /// Where a stale directory previously occupying the destination went.
    pub moved_aside: Option<PathBuf>,
}

/// Directory layout below the configured base path.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    incoming_directory: PathBuf,
    compendium_directory: PathBuf,
}

impl PayloadStore {
    pub fn new<P: AsRef<Path>>(incoming_directory: P, compendium_directory: P) -> Self {
        Self {
            incoming_directory: incoming_directory.as_ref().to_path_buf(),
            compendium_directory: compendium_directory.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.incoming_dir(), config.compendium_dir())
    }

    pub fn incoming_directory(&self) -> &Path {
        &self.incoming_directory
    }

    pub fn compendium_directory(&self) -> &Path {
        &self.compendium_directory
    }

    /// Creates the incoming and compendium subtrees if missing.
    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        self.ensure_directory(&self.incoming_directory)?;
        self.ensure_directory(&self.compendium_directory)
    }

    pub fn incoming_path(&self, id: &str) -> PathBuf {
        self.incoming_directory.join(id)
    }

    pub fn payload_path(&self, id: &str) -> PathBuf {
        self.compendium_directory.join(id)
    }

    /// Moves `from` to `<compendium>/<id>`.
    ///
    /// A directory already at the destination is renamed to
    /// `<id>_<upload_id>` first and never overwritten.
    pub fn move_to_canonical(
        &self,
        from: &Path,
        id: &str,
        upload_id: &str,
    ) -> Result<MoveOutcome, StorageError> {
        let destination = self.payload_path(id);
        if destination == from {
            return Ok(MoveOutcome {
                destination,
                moved_aside: None,
            });
        }

        let moved_aside = if std::fs::symlink_metadata(&destination).is_ok() {
            let backup = self.resolve_conflict(&format!("{}_{}", id, upload_id));
            std::fs::rename(&destination, &backup).map_err(|e| StorageError::Move {
                from: destination.clone(),
                to: backup.clone(),
                source: e,
            })?;
            Some(backup)
        } else {
            None
        };

        move_dir(from, &destination)?;

        Ok(MoveOutcome {
            destination,
            moved_aside,
        })
    }

    /// Renames a directory set aside by [`Self::move_to_canonical`] back to
    /// `canonical`. Does nothing while `canonical` is still occupied.
    pub fn restore_aside(&self, backup: &Path, canonical: &Path) -> Result<bool, StorageError> {
        if std::fs::symlink_metadata(canonical).is_ok() {
            return Ok(false);
        }
        std::fs::rename(backup, canonical).map_err(|e| StorageError::Move {
            from: backup.to_path_buf(),
            to: canonical.to_path_buf(),
            source: e,
        })?;
        Ok(true)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// First free name among `name`, `name_2`, `name_3`, ...
    fn resolve_conflict(&self, name: &str) -> PathBuf {
        let path = self.compendium_directory.join(name);
        if std::fs::symlink_metadata(&path).is_err() {
            return path;
        }

        let mut counter = 2u32;
        loop {
            let candidate = self
                .compendium_directory
                .join(format!("{}_{}", name, counter));
            if std::fs::symlink_metadata(&candidate).is_err() {
                return candidate;
            }
            counter += 1;
        }
    }
}
