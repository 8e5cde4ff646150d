use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::webdav::{parse_multistatus, DavEntry, DavRequest, PROPFIND_BODY};
use super::{ArchiveFetcher, SourceError};

/// Fetcher backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("compendium-loader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SourceError> {
        self.send(self.client.get(url), url).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, SourceError> {
        let response = request.send().await.map_err(|e| transport(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn write_body(
        mut response: reqwest::Response,
        url: &str,
        destination: &Path,
    ) -> Result<u64, SourceError> {
        let write_err = |e: std::io::Error| SourceError::Write {
            path: destination.to_path_buf(),
            source: e,
        };
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(write_err)?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| transport(url, e))? {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        debug!(bytes = written, "Download complete");
        Ok(written)
    }
}

fn transport(url: &str, e: reqwest::Error) -> SourceError {
    SourceError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| transport(url, e))
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, SourceError> {
        let response = self.get(url).await?;
        Self::write_body(response, url, destination).await
    }

    async fn list_share(&self, request: &DavRequest) -> Result<Vec<DavEntry>, SourceError> {
        let propfind = Method::from_bytes(b"PROPFIND").map_err(|e| SourceError::Transport {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let builder = self
            .client
            .request(propfind, &request.url)
            .basic_auth(&request.username, None::<&str>)
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY);

        let body = self
            .send(builder, &request.url)
            .await?
            .text()
            .await
            .map_err(|e| transport(&request.url, e))?;
        let entries = parse_multistatus(&body, &request.url)?;
        debug!(entries = entries.len(), "Share listing received");
        Ok(entries)
    }

    async fn download_share_file(
        &self,
        request: &DavRequest,
        destination: &Path,
    ) -> Result<u64, SourceError> {
        let builder = self
            .client
            .get(&request.url)
            .basic_auth(&request.username, None::<&str>);
        let response = self.send(builder, &request.url).await?;
        Self::write_body(response, &request.url, destination).await
    }
}
