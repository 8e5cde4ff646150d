//! WebDAV listings of public shares.
//!
//! Public links are browsed through the share's WebDAV endpoint with the
//! share token as user name and an empty password.

use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Url;

use super::SourceError;

/// Body sent with every `PROPFIND`.
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontenttype/>
  </d:prop>
</d:propfind>"#;

/// A resource on the share's WebDAV endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavRequest {
    pub url: String,
    pub username: String,
}

/// One member of a listed collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    pub name: String,
    pub is_dir: bool,
    pub content_type: Option<String>,
}

impl DavEntry {
    pub fn file(name: &str, content_type: &str) -> Self {
        Self {
            name: name.to_string(),
            is_dir: false,
            content_type: Some(content_type.to_string()),
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_dir: true,
            content_type: None,
        }
    }

    pub fn is_zip(&self) -> bool {
        !self.is_dir
            && self
                .content_type
                .as_deref()
                .and_then(|ct| ct.split(';').next())
                .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/zip"))
    }

    pub fn is_bag_declaration(&self) -> bool {
        !self.is_dir && self.name == "bagit.txt"
    }
}

/// What a share listing holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareContents {
    pub total: usize,
    pub bag_declarations: usize,
    pub directories: usize,
    pub zips: Vec<String>,
}

impl ShareContents {
    pub fn analyze(entries: &[DavEntry]) -> Self {
        let mut contents = ShareContents {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            if entry.is_bag_declaration() {
                contents.bag_declarations += 1;
            } else if entry.is_zip() {
                contents.zips.push(entry.name.clone());
            } else if entry.is_dir {
                contents.directories += 1;
            }
        }
        contents
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// The zip file to load on its own instead of the whole folder.
    ///
    /// Only folders without a bag declaration qualify. A requested file wins;
    /// otherwise the folder must hold exactly one zip.
    pub fn zip_to_load(&self, requested: Option<&str>) -> Result<Option<String>, SourceError> {
        if self.zips.is_empty() || self.bag_declarations > 0 {
            return Ok(None);
        }
        match (requested, self.zips.as_slice()) {
            (Some(file), _) => Ok(Some(file.to_string())),
            (None, [single]) => Ok(Some(single.clone())),
            (None, many) => Err(SourceError::MultipleZips { count: many.len() }),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    None,
    Href,
    ContentType,
}

/// Parses a depth-1 `PROPFIND` response for the collection at
/// `request_url` into its members.
///
/// The collection's own entry is dropped. A share whose root is a single
/// file cannot be browsed and is rejected.
pub fn parse_multistatus(xml: &str, request_url: &str) -> Result<Vec<DavEntry>, SourceError> {
    let base = Url::parse(request_url).map_err(|e| listing_error(request_url, e))?;
    let base_path = base.path().trim_end_matches('/').to_string();

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut field = Field::None;
    let mut href = String::new();
    let mut content_type = String::new();
    let mut is_dir = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"response" => {
                    href.clear();
                    content_type.clear();
                    is_dir = false;
                }
                b"href" => field = Field::Href,
                b"getcontenttype" => field = Field::ContentType,
                b"collection" => is_dir = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"collection" {
                    is_dir = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                match field {
                    Field::Href => href.push_str(&text),
                    Field::ContentType => content_type.push_str(&text),
                    Field::None => {}
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"href" | b"getcontenttype" => field = Field::None,
                b"response" => {
                    let resolved = base.join(&href).map_err(|e| listing_error(request_url, e))?;
                    let path = resolved.path().trim_end_matches('/');
                    if path == base_path {
                        if !is_dir {
                            return Err(SourceError::DirectFileShare);
                        }
                        continue;
                    }
                    let Some(name) = path.rsplit('/').next().filter(|n| !n.is_empty()) else {
                        continue;
                    };
                    entries.push(DavEntry {
                        name: percent_decode_str(name).decode_utf8_lossy().into_owned(),
                        is_dir,
                        content_type: (!content_type.is_empty()).then(|| content_type.clone()),
                    });
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(listing_error(request_url, e)),
            _ => {}
        }
    }

    Ok(entries)
}

fn listing_error(url: &str, reason: impl std::fmt::Display) -> SourceError {
    SourceError::ShareListing {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
