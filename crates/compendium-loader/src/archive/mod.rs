//! Archive materialization: format sniffing, safe extraction and single
//! basedir stripping.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::ArchiveError;

pub mod basedir;

pub use basedir::strip_single_basedir;

/// MIME types accepted for direct uploads.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip",
    "application/x-zip-compressed",
    "multipart/x-zip",
    "application/gzip",
    "application/x-gzip",
    "application/x-tar",
    "application/x-compressed-tar",
];

pub fn is_supported_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    SUPPORTED_MIME_TYPES
        .iter()
        .any(|m| m.eq_ignore_ascii_case(essence))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Sniffs the format from the leading bytes of `path`.
    pub fn detect(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = open(path)?;
        let mut head = [0u8; 262];
        let read = read_up_to(&mut file, &mut head).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let head = &head[..read];

        if head.is_empty() {
            return Err(ArchiveError::Empty);
        }
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Ok(ArchiveFormat::Zip);
        }
        if head.starts_with(&[0x1f, 0x8b]) {
            return Ok(ArchiveFormat::TarGz);
        }
        if head.len() >= 262 && &head[257..262] == b"ustar" {
            return Ok(ArchiveFormat::Tar);
        }
        Err(ArchiveError::UnsupportedFormat)
    }
}

/// What an extraction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub format: ArchiveFormat,
    pub files: usize,
    pub directories: usize,
}

/// Extracts the full contents of `archive` into `target`, creating it.
///
/// Entries that would land outside `target` abort the extraction. An
/// archive without a single regular file counts as empty.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<ExtractSummary, ArchiveError> {
    let format = ArchiveFormat::detect(archive)?;
    std::fs::create_dir_all(target).map_err(|e| ArchiveError::Write {
        path: target.to_path_buf(),
        source: e,
    })?;

    let (files, directories) = match format {
        ArchiveFormat::Zip => extract_zip(archive, target)?,
        ArchiveFormat::TarGz => extract_tar(GzDecoder::new(open(archive)?), target)?,
        ArchiveFormat::Tar => extract_tar(open(archive)?, target)?,
    };

    if files == 0 {
        return Err(ArchiveError::Empty);
    }

    debug!(?format, files, directories, "Archive extracted");

    Ok(ExtractSummary {
        format,
        files,
        directories,
    })
}

fn extract_zip(archive: &Path, target: &Path) -> Result<(usize, usize), ArchiveError> {
    let mut zip = zip::ZipArchive::new(open(archive)?)
        .map_err(|e| ArchiveError::Corrupt(format!("Failed to open zip: {}", e)))?;

    let mut files = 0;
    let mut directories = 0;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(format!("Failed to read entry {}: {}", index, e)))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let out_path = target.join(&relative);

        if entry.is_dir() {
            create_dir(&out_path)?;
            directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }
        let name = entry.name().to_string();
        write_entry(&mut entry, &out_path, &name)?;
        files += 1;
    }

    Ok((files, directories))
}

fn extract_tar<R: Read>(reader: R, target: &Path) -> Result<(usize, usize), ArchiveError> {
    let mut tar = tar::Archive::new(reader);
    let entries = tar
        .entries()
        .map_err(|e| ArchiveError::Corrupt(format!("Failed to read tar: {}", e)))?;

    let mut files = 0;
    let mut directories = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| ArchiveError::Corrupt(format!("Failed to read entry: {}", e)))?;
        let kind = entry.header().entry_type();
        let path = entry
            .path()
            .map_err(|e| ArchiveError::Corrupt(format!("Invalid entry path: {}", e)))?
            .into_owned();

        if !(kind.is_file() || kind.is_dir()) {
            debug!(entry = %path.display(), "Skipping non-regular tar entry");
            continue;
        }

        let out_path = target.join(validate_entry_path(&path)?);

        if kind.is_dir() {
            create_dir(&out_path)?;
            directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }
        let name = path.display().to_string();
        let expected = entry.size();
        let written = write_entry(&mut entry, &out_path, &name)?;
        if written != expected {
            return Err(ArchiveError::Corrupt(format!(
                "Entry '{}' is truncated ({} of {} bytes)",
                name, written, expected
            )));
        }
        files += 1;
    }

    Ok((files, directories))
}

/// Streams one entry into a new file at `out_path`. Failures reading the
/// entry mean the archive is damaged; only the output side reports `Write`.
fn write_entry<R: Read>(entry: &mut R, out_path: &Path, name: &str) -> Result<u64, ArchiveError> {
    let write_error = |e: std::io::Error| ArchiveError::Write {
        path: out_path.to_path_buf(),
        source: e,
    };
    let mut out = File::create(out_path).map_err(write_error)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ArchiveError::Corrupt(format!(
                    "Failed to read '{}': {}",
                    name, e
                )))
            }
        };
        out.write_all(&buf[..n]).map_err(write_error)?;
        written += n as u64;
    }
    Ok(written)
}

/// Rejects absolute paths and parent traversal inside an entry name.
fn validate_entry_path(path: &Path) -> Result<PathBuf, ArchiveError> {
    if path.as_os_str().is_empty() {
        return Err(ArchiveError::UnsafePath(String::new()));
    }
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

fn open(path: &Path) -> Result<File, ArchiveError> {
    File::open(path).map_err(|e| ArchiveError::Open {
        path: path.to_path_buf(),
        source: e,
    })
}

fn create_dir(path: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(path).map_err(|e| ArchiveError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(total)
}
