//! Zenodo records: identifier parsing and archive link discovery.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::config::ZenodoConfig;

use super::SourceError;

static RE_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+/zenodo\.(\d+)$").unwrap());
static RE_LINK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap());
static RE_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

pub const ZENODO_HOST: &str = "zenodo.org";
pub const SANDBOX_HOST: &str = "sandbox.zenodo.org";

/// A record identified by its numeric id on one Zenodo instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZenodoRecord {
    pub id: String,
    pub host: String,
}

impl ZenodoRecord {
    /// Parses a record id, a DOI (`10.5281/zenodo.268443`), a DOI URL, or
    /// a record URL (`https://sandbox.zenodo.org/record/59917`).
    ///
    /// `host` overrides the instance; otherwise the URL host or
    /// `default_host` applies.
    pub fn parse(input: &str, host: Option<&str>, default_host: &str) -> Result<Self, SourceError> {
        let input = input.trim();
        let (id, url_host) = if input.starts_with("http://") || input.starts_with("https://") {
            parse_url(input)?
        } else if input.contains('/') {
            (doi_record_id(input)?, None)
        } else {
            (input.to_string(), None)
        };

        let host = host
            .map(str::to_string)
            .or(url_host)
            .unwrap_or_else(|| default_host.to_string());

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SourceError::InvalidRecordId(id));
        }

        Ok(Self { id, host })
    }

    /// Record base URL for this record's host; only Zenodo and its sandbox
    /// are accepted.
    pub fn base_url<'a>(&self, config: &'a ZenodoConfig) -> Result<&'a str, SourceError> {
        match self.host.as_str() {
            ZENODO_HOST => Ok(&config.zenodo_url),
            SANDBOX_HOST => Ok(&config.sandbox_url),
            _ => Err(SourceError::HostNotAllowed {
                host: self.host.clone(),
            }),
        }
    }

    pub fn record_url(&self, base: &str) -> String {
        format!("{}{}", ensure_trailing_slash(base), self.id)
    }

    pub fn file_url(&self, base: &str, filename: &str) -> String {
        format!("{}/files/{}", self.record_url(base), filename)
    }
}

fn ensure_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

fn doi_record_id(doi: &str) -> Result<String, SourceError> {
    RE_DOI
        .captures(doi)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SourceError::InvalidDoi(doi.to_string()))
}

fn parse_url(input: &str) -> Result<(String, Option<String>), SourceError> {
    let url = Url::parse(input).map_err(|_| SourceError::InvalidShareUrl(input.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SourceError::InvalidShareUrl(input.to_string()))?
        .to_string();
    let path = url.path().trim_matches('/');

    if host == "doi.org" || host.ends_with(".doi.org") {
        return Ok((doi_record_id(path)?, None));
    }

    let id = path.rsplit('/').next().unwrap_or_default().to_string();
    Ok((id, Some(host)))
}

/// First `<link rel="alternate" type="application/zip" href=...>` on a
/// record page.
pub fn find_zip_link(html: &str) -> Option<String> {
    RE_LINK_TAG.find_iter(html).find_map(|tag| {
        let mut rel = None;
        let mut kind = None;
        let mut href = None;
        for attr in RE_ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match attr[1].to_ascii_lowercase().as_str() {
                "rel" => rel = value,
                "type" => kind = value,
                "href" => href = value,
                _ => {}
            }
        }
        let is_zip = rel == Some("alternate") && kind == Some("application/zip");
        href.filter(|_| is_zip).map(|h| h.replace("&amp;", "&"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZenodoConfig {
        ZenodoConfig::default()
    }

    #[test]
    fn test_parse_numeric_id() {
        let record = ZenodoRecord::parse("268443", None, ZENODO_HOST).unwrap();
        assert_eq!(record.id, "268443");
        assert_eq!(record.host, ZENODO_HOST);
    }

    #[test]
    fn test_parse_doi() {
        let record = ZenodoRecord::parse("10.5281/zenodo.268443", None, ZENODO_HOST).unwrap();
        assert_eq!(record.id, "268443");

        let err = ZenodoRecord::parse("10.5281/figshare.268443", None, ZENODO_HOST).unwrap_err();
        assert!(matches!(err, SourceError::InvalidDoi(_)));
        assert_eq!(err.public_message(), "DOI is invalid");
        assert_eq!(err.status(), 422);
    }

    #[test]
    fn test_parse_doi_url() {
        let record =
            ZenodoRecord::parse("https://doi.org/10.5281/zenodo.268443", None, SANDBOX_HOST)
                .unwrap();
        assert_eq!(record.id, "268443");
        assert_eq!(record.host, SANDBOX_HOST);
    }

    #[test]
    fn test_parse_record_url_takes_host() {
        let record =
            ZenodoRecord::parse("https://sandbox.zenodo.org/record/59917", None, ZENODO_HOST)
                .unwrap();
        assert_eq!(record.id, "59917");
        assert_eq!(record.host, SANDBOX_HOST);
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let err = ZenodoRecord::parse("abc", None, ZENODO_HOST).unwrap_err();
        assert!(matches!(err, SourceError::InvalidRecordId(_)));
        assert_eq!(err.public_message(), "zenodo ID is not a number");
    }

    #[test]
    fn test_base_url_restricts_hosts() {
        let config = config();
        let record = ZenodoRecord::parse("1", None, ZENODO_HOST).unwrap();
        assert_eq!(record.base_url(&config).unwrap(), config.zenodo_url);

        let record = ZenodoRecord::parse("1", Some(SANDBOX_HOST), ZENODO_HOST).unwrap();
        assert_eq!(record.base_url(&config).unwrap(), config.sandbox_url);

        let record = ZenodoRecord::parse("1", Some("example.org"), ZENODO_HOST).unwrap();
        let err = record.base_url(&config).unwrap_err();
        assert_eq!(err.status(), 403);
        assert_eq!(err.public_message(), "host is not allowed");
    }

    #[test]
    fn test_record_and_file_urls() {
        let record = ZenodoRecord::parse("69114", None, ZENODO_HOST).unwrap();
        assert_eq!(
            record.record_url("https://zenodo.org/record/"),
            "https://zenodo.org/record/69114"
        );
        assert_eq!(
            record.file_url("https://zenodo.org/record", "metatainer.zip"),
            "https://zenodo.org/record/69114/files/metatainer.zip"
        );
    }

    #[test]
    fn test_find_zip_link() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/static/site.css">
            <link rel="alternate" type="application/json" href="https://sandbox.zenodo.org/api/records/69114">
            <link rel="alternate" type="application/zip" href="https://sandbox.zenodo.org/record/69114/files/metatainer.zip">
            <link rel="alternate" type="application/zip" href="https://sandbox.zenodo.org/record/69114/files/other.zip">
            </head></html>"#;
        assert_eq!(
            find_zip_link(html).as_deref(),
            Some("https://sandbox.zenodo.org/record/69114/files/metatainer.zip")
        );
    }

    #[test]
    fn test_find_zip_link_attribute_order_and_entities() {
        let html = r#"<LINK href='https://zenodo.org/record/1/files/a.zip?download=1&amp;x=2' type='application/zip' rel='alternate' />"#;
        assert_eq!(
            find_zip_link(html).as_deref(),
            Some("https://zenodo.org/record/1/files/a.zip?download=1&x=2")
        );
    }

    #[test]
    fn test_find_zip_link_none() {
        assert_eq!(find_zip_link("<html><head></head></html>"), None);
    }
}
