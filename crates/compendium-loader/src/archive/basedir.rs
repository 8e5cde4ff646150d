use std::path::Path;

use tracing::debug;

use crate::error::StorageError;

/// Hoists the contents of a lone top-level directory up one level.
///
/// Only applies when `root` contains exactly one entry and that entry is a
/// directory. Any other layout is left untouched. Returns the name of the
/// stripped directory.
pub fn strip_single_basedir(root: &Path) -> Result<Option<String>, StorageError> {
    let entries = list_entries(root)?;
    if entries.len() != 1 {
        debug!(entries = entries.len(), "No single basedir, nothing to strip");
        return Ok(None);
    }

    let wrapper = &entries[0];
    let is_dir = std::fs::symlink_metadata(wrapper)
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Ok(None);
    }

    let name = wrapper
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // The wrapper may contain a child with its own name.
    let staging = root.join(format!(".{}.strip", name));
    rename(wrapper, &staging)?;

    for child in list_entries(&staging)? {
        let Some(child_name) = child.file_name() else {
            continue;
        };
        rename(&child, &root.join(child_name))?;
    }

    std::fs::remove_dir(&staging).map_err(|e| StorageError::Remove {
        path: staging.clone(),
        source: e,
    })?;

    debug!(basedir = %name, "Stripped single basedir");
    Ok(Some(name))
}

fn list_entries(dir: &Path) -> Result<Vec<std::path::PathBuf>, StorageError> {
    let read_err = |e: std::io::Error| StorageError::ReadDirectory {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        entries.push(entry.map_err(read_err)?.path());
    }
    entries.sort();
    Ok(entries)
}

fn rename(from: &Path, to: &Path) -> Result<(), StorageError> {
    std::fs::rename(from, to).map_err(|e| StorageError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}
