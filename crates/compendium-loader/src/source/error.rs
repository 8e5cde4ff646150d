use std::path::PathBuf;

use thiserror::Error;

/// Errors resolving a source descriptor into a local archive.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Host '{host}' is not allowed")]
    HostNotAllowed { host: String },

    #[error("Invalid public share URL '{0}'")]
    InvalidShareUrl(String),

    #[error("Invalid DOI '{0}'")]
    InvalidDoi(String),

    #[error("Zenodo record id '{0}' is not a number")]
    InvalidRecordId(String),

    #[error("Zenodo record not found at {url}")]
    RecordNotFound { url: String },

    #[error("No zip file linked from Zenodo record at {url}")]
    NoArchiveInRecord { url: String },

    #[error("Public share is empty")]
    EmptyShare,

    #[error("Cannot list public share at {url}: {reason}")]
    ShareListing { url: String, reason: String },

    #[error("Public share holds {count} zip files and no file name was given")]
    MultipleZips { count: usize },

    #[error("Download of zip file '{name}' from public share failed: {reason}")]
    ZipDownload { name: String, reason: String },

    #[error("Public share is a single file, not a folder")]
    DirectFileShare,

    #[error("Uploaded file not found at '{path}'")]
    MissingUpload { path: PathBuf },

    #[error("Request to {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Failed to write download to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub fn status(&self) -> u16 {
        match self {
            SourceError::HostNotAllowed { .. } => 403,
            SourceError::InvalidShareUrl(_)
            | SourceError::InvalidDoi(_)
            | SourceError::InvalidRecordId(_) => 422,
            SourceError::RecordNotFound { .. }
            | SourceError::NoArchiveInRecord { .. }
            | SourceError::MissingUpload { .. }
            | SourceError::Http { .. }
            | SourceError::ShareListing { .. }
            | SourceError::MultipleZips { .. }
            | SourceError::ZipDownload { .. }
            | SourceError::DirectFileShare => 404,
            SourceError::EmptyShare => 400,
            SourceError::Transport { .. } | SourceError::Write { .. } => 500,
        }
    }

    /// Message safe to hand to the caller. Never contains URLs or paths.
    pub fn public_message(&self) -> &'static str {
        match self {
            SourceError::HostNotAllowed { .. } => "host is not allowed",
            SourceError::InvalidShareUrl(_) => "public share URL is invalid",
            SourceError::InvalidDoi(_) => "DOI is invalid",
            SourceError::InvalidRecordId(_) => "zenodo ID is not a number",
            SourceError::RecordNotFound { .. } => "Zenodo record not found!",
            SourceError::NoArchiveInRecord { .. } => "No files found in zenodo deposit.",
            SourceError::EmptyShare => "public share is empty",
            SourceError::ShareListing { .. } => "could not read webdav contents",
            SourceError::MultipleZips { .. } => {
                "Multiple zip files found but no filename provided"
            }
            SourceError::ZipDownload { .. } => "could not download zip file",
            SourceError::DirectFileShare => {
                "Direct file submission is not supported. Please submit a shared folder containing the file."
            }
            SourceError::MissingUpload { .. } => "uploaded file not found",
            SourceError::Http { .. } => "could not download archive",
            SourceError::Transport { .. } | SourceError::Write { .. } => "download failed",
        }
    }
}
