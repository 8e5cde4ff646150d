//! Public WebDAV shares (ownCloud/Nextcloud style `/s/<token>` links).

use reqwest::Url;

use super::webdav::DavRequest;
use super::SourceError;

/// A validated public share and the path inside it to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLocation {
    pub share_url: String,
    pub token: String,
    /// Directory inside the share, always starting with `/`.
    pub path: String,
    /// Single zip file inside `path`, when the request named one.
    pub file: Option<String>,
}

impl ShareLocation {
    /// URL the share serves the folder at `path` from as one zip archive.
    pub fn download_url(&self) -> Result<String, SourceError> {
        let base = format!("{}/download", self.share_url.trim_end_matches('/'));
        let mut url = Url::parse(&base).map_err(|_| self.invalid())?;
        url.query_pairs_mut().append_pair("path", &self.path);
        Ok(url.to_string())
    }

    /// WebDAV address of the folder at `path`, or of `file` inside it.
    ///
    /// `webdav_path` is resolved against the share URL, so it replaces the
    /// `/s/<token>` part.
    pub fn dav_request(
        &self,
        webdav_path: &str,
        file: Option<&str>,
    ) -> Result<DavRequest, SourceError> {
        let mut url = Url::parse(&self.share_url)
            .and_then(|u| u.join(webdav_path))
            .map_err(|_| self.invalid())?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| self.invalid())?;
            segments.pop_if_empty();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));
            if let Some(file) = file {
                segments.push(file);
            }
        }
        Ok(DavRequest {
            url: url.to_string(),
            username: self.token.clone(),
        })
    }

    fn invalid(&self) -> SourceError {
        SourceError::InvalidShareUrl(self.share_url.clone())
    }
}

/// The second-level label of a host name: `sciebo` for
/// `uni-muenster.sciebo.de`.
pub fn host_label(host: &str) -> Option<&str> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2])
}

/// Validates `share_url` against the allowed hosts and normalizes `path`.
///
/// A path ending in `.zip` selects that single file from its parent
/// directory.
pub fn parse_share(
    share_url: &str,
    path: Option<&str>,
    allowed_hosts: &[String],
) -> Result<ShareLocation, SourceError> {
    let url = Url::parse(share_url)
        .map_err(|_| SourceError::InvalidShareUrl(share_url.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SourceError::InvalidShareUrl(share_url.to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| SourceError::InvalidShareUrl(share_url.to_string()))?;
    let allowed = host_label(host)
        .map(|label| allowed_hosts.iter().any(|h| h == label))
        .unwrap_or(false);
    if !allowed {
        return Err(SourceError::HostNotAllowed {
            host: host.to_string(),
        });
    }

    let token = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| SourceError::InvalidShareUrl(share_url.to_string()))?;

    let mut path = match path {
        None | Some("") => "/".to_string(),
        Some(p) if p.starts_with('/') => p.to_string(),
        Some(p) => format!("/{}", p),
    };

    let mut file = None;
    if path.ends_with(".zip") {
        let split = path.rfind('/').unwrap_or(0);
        file = Some(path[split + 1..].to_string());
        path = if split == 0 {
            "/".to_string()
        } else {
            path[..split].to_string()
        };
    }

    Ok(ShareLocation {
        share_url: share_url.trim_end_matches('/').to_string(),
        token,
        path,
        file,
    })
}
