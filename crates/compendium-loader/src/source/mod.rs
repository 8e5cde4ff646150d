//! Source adapters: turn a source descriptor into a local archive file.

pub mod error;
pub mod http;
pub mod share;
pub mod webdav;
pub mod zenodo;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{SourcesConfig, WebdavConfig, ZenodoConfig};
use crate::sanitize;

pub use error::SourceError;
pub use http::HttpFetcher;
pub use share::ShareLocation;
pub use webdav::{DavEntry, DavRequest, ShareContents};
pub use zenodo::ZenodoRecord;

/// Where the archive of one ingestion comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// A file received by the caller, optionally with its declared MIME type.
    Upload { path: PathBuf, mime: Option<String> },
    /// A public WebDAV share and the path inside it.
    Share { url: String, path: Option<String> },
    /// A Zenodo record id, DOI, or record URL.
    Zenodo {
        record: String,
        host: Option<String>,
        filename: Option<String>,
    },
}

impl SourceDescriptor {
    /// Routes a public link by host: Zenodo and DOI links load the record,
    /// everything else is treated as a WebDAV share.
    pub fn for_share_url(url: &str, path: Option<String>) -> Self {
        let label = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().and_then(share::host_label).map(str::to_string));
        match label.as_deref() {
            Some("zenodo") | Some("doi") => SourceDescriptor::Zenodo {
                record: url.to_string(),
                host: None,
                filename: None,
            },
            _ => SourceDescriptor::Share { url: url.to_string(), path },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::Upload { .. } => "upload",
            SourceDescriptor::Share { .. } => "share",
            SourceDescriptor::Zenodo { .. } => "zenodo",
        }
    }

    /// Label safe for logs: file names only, share tokens masked.
    pub fn redacted(&self) -> String {
        match self {
            SourceDescriptor::Upload { path, .. } => sanitize::redact_path(path),
            SourceDescriptor::Share { url, .. } => sanitize::redact_share_url(url),
            SourceDescriptor::Zenodo { record, .. } => record.clone(),
        }
    }
}

/// The archive a source resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub archive_path: PathBuf,
    /// Public URL the archive was loaded from, for remote sources.
    pub source_url: Option<String>,
}

/// Network access used by the remote adapters.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError>;

    /// Writes the body at `url` to `destination`, returning the byte count.
    async fn download(&self, url: &str, destination: &Path) -> Result<u64, SourceError>;

    /// Lists the members of the WebDAV collection at `request`.
    async fn list_share(&self, request: &DavRequest) -> Result<Vec<DavEntry>, SourceError>;

    /// Writes the WebDAV file at `request` to `destination`, returning the
    /// byte count.
    async fn download_share_file(
        &self,
        request: &DavRequest,
        destination: &Path,
    ) -> Result<u64, SourceError>;
}

pub struct SourceResolver {
    fetcher: Arc<dyn ArchiveFetcher>,
    webdav: WebdavConfig,
    zenodo: ZenodoConfig,
}

impl SourceResolver {
    pub fn new(config: &SourcesConfig, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        Self {
            fetcher,
            webdav: config.webdav.clone(),
            zenodo: config.zenodo.clone(),
        }
    }

    /// Places the archive for `source` at `destination`.
    pub async fn resolve(
        &self,
        source: &SourceDescriptor,
        destination: &Path,
    ) -> Result<ResolvedSource, SourceError> {
        match source {
            SourceDescriptor::Upload { path, .. } => self.receive_upload(path, destination).await,
            SourceDescriptor::Share { url, path } => {
                self.load_share(url, path.as_deref(), destination).await
            }
            SourceDescriptor::Zenodo {
                record,
                host,
                filename,
            } => {
                self.load_zenodo(record, host.as_deref(), filename.as_deref(), destination)
                    .await
            }
        }
    }

    async fn receive_upload(
        &self,
        path: &Path,
        destination: &Path,
    ) -> Result<ResolvedSource, SourceError> {
        if !path.is_file() {
            return Err(SourceError::MissingUpload {
                path: path.to_path_buf(),
            });
        }
        let bytes = tokio::fs::copy(path, destination)
            .await
            .map_err(|e| SourceError::Write {
                path: destination.to_path_buf(),
                source: e,
            })?;
        debug!(bytes, "Received upload");
        Ok(ResolvedSource {
            archive_path: destination.to_path_buf(),
            source_url: None,
        })
    }

    async fn load_share(
        &self,
        url: &str,
        path: Option<&str>,
        destination: &Path,
    ) -> Result<ResolvedSource, SourceError> {
        let share = share::parse_share(url, path, &self.webdav.allowed_hosts)?;
        let redacted = sanitize::redact_share_url(&share.share_url);

        let listing = share.dav_request(&self.webdav.webdav_path, None)?;
        let entries = self
            .fetcher
            .list_share(&listing)
            .await
            .map_err(|e| match e {
                SourceError::Http { .. } | SourceError::Transport { .. } => {
                    SourceError::ShareListing {
                        url: redacted.clone(),
                        reason: e.to_string(),
                    }
                }
                other => other,
            })?;

        let contents = ShareContents::analyze(&entries);
        debug!(
            bags = contents.bag_declarations,
            zips = contents.zips.len(),
            directories = contents.directories,
            total = contents.total,
            "Share contents analyzed"
        );
        if contents.is_empty() {
            return Err(SourceError::EmptyShare);
        }

        if let Some(zip) = contents.zip_to_load(share.file.as_deref())? {
            let request = share.dav_request(&self.webdav.webdav_path, Some(&zip))?;
            info!(
                share = %redacted,
                path = %share.path,
                file = %zip,
                "Downloading zip file from public share"
            );
            match self.fetcher.download_share_file(&request, destination).await {
                Ok(bytes) => debug!(bytes, "Zip file download complete"),
                Err(e) => {
                    warn!(error = %e, "Zip file download failed");
                    discard(destination).await;
                    return Err(SourceError::ZipDownload {
                        name: zip,
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            let download_url = share.download_url()?;
            info!(share = %redacted, path = %share.path, "Downloading public share");
            let bytes = self.fetcher.download(&download_url, destination).await?;
            if bytes == 0 {
                discard(destination).await;
                return Err(SourceError::EmptyShare);
            }
        }

        Ok(ResolvedSource {
            archive_path: destination.to_path_buf(),
            source_url: Some(share.share_url),
        })
    }

    async fn load_zenodo(
        &self,
        input: &str,
        host: Option<&str>,
        filename: Option<&str>,
        destination: &Path,
    ) -> Result<ResolvedSource, SourceError> {
        let record = ZenodoRecord::parse(input, host, &self.zenodo.default_host)?;
        let base = record.base_url(&self.zenodo)?;
        let record_url = record.record_url(base);

        let link = match filename {
            Some(name) => record.file_url(base, name),
            None => {
                let page = self.fetcher.fetch_text(&record_url).await.map_err(|e| match e {
                    SourceError::Http { url, .. } => SourceError::RecordNotFound { url },
                    other => other,
                })?;
                zenodo::find_zip_link(&page).ok_or_else(|| SourceError::NoArchiveInRecord {
                    url: record_url.clone(),
                })?
            }
        };
        info!(record = %record.id, host = %record.host, "Downloading Zenodo record");

        let bytes = self.fetcher.download(&link, destination).await?;
        debug!(bytes, "Zenodo download complete");

        Ok(ResolvedSource {
            archive_path: destination.to_path_buf(),
            source_url: Some(record_url),
        })
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "Failed to remove discarded download");
        }
    }
}
