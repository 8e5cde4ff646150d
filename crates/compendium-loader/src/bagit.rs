//! Structural BagIt validation: `bagit.txt`, payload manifests and
//! checksums.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use digest::Digest;
use md5::Md5;
use sha2::{Sha256, Sha512};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::sanitize;

#[derive(Error, Debug)]
pub enum BagError {
    #[error("Missing `bagit.txt` file")]
    MissingBagItTxt,

    #[error("Missing at least a manifest file")]
    MissingManifest,

    #[error("Unsupported manifest algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("Malformed line {line} in {manifest}")]
    MalformedManifestLine { manifest: String, line: usize },

    #[error("Manifest entry points outside the bag: {0}")]
    UnsafeManifestPath(String),

    #[error("Payload file listed in {manifest} is missing: {file}")]
    MissingPayload { manifest: String, file: String },

    #[error("Checksum mismatch for {file} in {manifest}")]
    ChecksumMismatch { manifest: String, file: String },

    #[error("Payload file not listed in {manifest}: {file}")]
    UnlistedPayload { manifest: String, file: String },

    #[error("Payload-Oxum mismatch: declared {declared}, found {actual}")]
    OxumMismatch { declared: String, actual: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation task aborted: {0}")]
    Aborted(String),
}

/// Checks a bag for structural validity.
#[async_trait]
pub trait BagValidator: Send + Sync {
    async fn validate(&self, bag: &Path) -> Result<(), BagError>;
}

/// Validator reading `manifest-<alg>.txt` files and recomputing checksums.
#[derive(Debug, Clone)]
pub struct ManifestBagValidator {
    payload_directory: String,
    fast: bool,
}

impl ManifestBagValidator {
    pub fn new(payload_directory: impl Into<String>, fast: bool) -> Self {
        Self {
            payload_directory: payload_directory.into(),
            fast,
        }
    }
}

#[async_trait]
impl BagValidator for ManifestBagValidator {
    async fn validate(&self, bag: &Path) -> Result<(), BagError> {
        let bag = bag.to_path_buf();
        let payload_directory = self.payload_directory.clone();
        let fast = self.fast;
        tokio::task::spawn_blocking(move || validate_bag(&bag, &payload_directory, fast))
            .await
            .map_err(|e| BagError::Aborted(e.to_string()))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Sha256,
    Sha512,
}

impl Algorithm {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "md5" => Some(Algorithm::Md5),
            "sha256" => Some(Algorithm::Sha256),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn hex_digest(self, bytes: &[u8]) -> String {
        match self {
            Algorithm::Md5 => hex::encode(Md5::digest(bytes)),
            Algorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            Algorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

/// Validates the bag rooted at `bag`.
///
/// In fast mode only the `Payload-Oxum` of `bag-info.txt` is compared; bags
/// without one fall back to full validation.
pub fn validate_bag(bag: &Path, payload_directory: &str, fast: bool) -> Result<(), BagError> {
    if !bag.join("bagit.txt").is_file() {
        return Err(BagError::MissingBagItTxt);
    }

    let payload = collect_payload(bag, payload_directory)?;

    if fast {
        if let Some(declared) = read_payload_oxum(bag)? {
            let actual = payload_oxum(bag, &payload)?;
            if declared != actual {
                return Err(BagError::OxumMismatch { declared, actual });
            }
            debug!(oxum = %actual, "Bag passed fast validation");
            return Ok(());
        }
    }

    let manifests = find_manifests(bag)?;
    if manifests.is_empty() {
        return Err(BagError::MissingManifest);
    }

    for (algorithm_name, manifest) in manifests {
        let algorithm = Algorithm::from_name(&algorithm_name)
            .ok_or_else(|| BagError::UnsupportedAlgorithm(algorithm_name.clone()))?;
        verify_manifest(bag, &manifest, algorithm, &payload)?;
    }

    debug!(files = payload.len(), "Bag passed validation");
    Ok(())
}

/// Payload files relative to the bag root, forward-slash separated.
fn collect_payload(bag: &Path, payload_directory: &str) -> Result<BTreeSet<String>, BagError> {
    let root = bag.join(payload_directory);
    let mut files = BTreeSet::new();
    if !root.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = entry.map_err(|e| BagError::Io {
            path: root.clone(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.insert(sanitize::relative_path(entry.path(), bag));
        }
    }
    Ok(files)
}

fn find_manifests(bag: &Path) -> Result<Vec<(String, PathBuf)>, BagError> {
    let io_err = |e: std::io::Error| BagError::Io {
        path: bag.to_path_buf(),
        source: e,
    };
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(bag).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        let algorithm = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("manifest-"))
            .and_then(|n| n.strip_suffix(".txt"))
            .map(str::to_string);
        if let Some(algorithm) = algorithm {
            manifests.push((algorithm, path));
        }
    }
    manifests.sort();
    Ok(manifests)
}

fn verify_manifest(
    bag: &Path,
    manifest: &Path,
    algorithm: Algorithm,
    payload: &BTreeSet<String>,
) -> Result<(), BagError> {
    let manifest_name = sanitize::redact_path(manifest);
    let content = std::fs::read_to_string(manifest).map_err(|e| BagError::Io {
        path: manifest.to_path_buf(),
        source: e,
    })?;

    let mut listed = BTreeSet::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (expected, file) = line
            .split_once(char::is_whitespace)
            .map(|(sum, file)| (sum.trim(), decode_manifest_path(file.trim_start())))
            .ok_or_else(|| BagError::MalformedManifestLine {
                manifest: manifest_name.clone(),
                line: index + 1,
            })?;
        if file.is_empty() {
            return Err(BagError::MalformedManifestLine {
                manifest: manifest_name.clone(),
                line: index + 1,
            });
        }
        if file.split('/').any(|part| part == "..") || file.starts_with('/') {
            return Err(BagError::UnsafeManifestPath(file));
        }

        let path = bag.join(&file);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BagError::MissingPayload {
                manifest: manifest_name.clone(),
                file: file.clone(),
            },
            _ => BagError::Io {
                path: path.clone(),
                source: e,
            },
        })?;

        if !algorithm.hex_digest(&bytes).eq_ignore_ascii_case(expected) {
            return Err(BagError::ChecksumMismatch {
                manifest: manifest_name.clone(),
                file,
            });
        }
        listed.insert(file);
    }

    if let Some(unlisted) = payload.difference(&listed).next() {
        return Err(BagError::UnlistedPayload {
            manifest: manifest_name,
            file: unlisted.clone(),
        });
    }
    Ok(())
}

/// Undoes the percent-encoding BagIt applies to CR, LF and `%`.
fn decode_manifest_path(raw: &str) -> String {
    raw.replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%25", "%")
}

fn read_payload_oxum(bag: &Path) -> Result<Option<String>, BagError> {
    let path = bag.join("bag-info.txt");
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| BagError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(content.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("Payload-Oxum")
            .then(|| value.trim().to_string())
    }))
}

fn payload_oxum(bag: &Path, payload: &BTreeSet<String>) -> Result<String, BagError> {
    let mut octets = 0u64;
    for file in payload {
        let path = bag.join(file);
        let meta = std::fs::metadata(&path).map_err(|e| BagError::Io {
            path: path.clone(),
            source: e,
        })?;
        octets += meta.len();
    }
    Ok(format!("{}.{}", octets, payload.len()))
}
