use std::path::PathBuf;

use serde_json::Value;

use crate::source::SourceDescriptor;

use super::error::{IngestError, PipelineWarning};

/// What the caller asks to ingest, already authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub owner: String,
    pub content_type: String,
    pub source: SourceDescriptor,
}

/// State threaded through the stages of one ingestion.
///
/// Fields only accumulate; the payload path changes once, when the
/// payload moves to its canonical location.
pub struct PipelineContext {
    // Input
    pub request: IngestRequest,

    /// Final identifier; starts as `upload_id`, replaced once by a declared id.
    pub id: String,
    /// Random token the ingestion started under.
    pub upload_id: String,

    // Source resolution
    pub archive_path: Option<PathBuf>,
    pub source_url: Option<String>,

    // Extraction
    pub payload_path: Option<PathBuf>,

    // Classification
    pub is_bag: bool,
    pub is_compendium: bool,
    pub config_path: Option<PathBuf>,

    // Content validation
    pub text_files: Vec<PathBuf>,

    // Metadata, keyed by `raw` and each mapping's target element
    pub metadata_dir: Option<PathBuf>,
    pub metadata: Value,

    /// Directories removed if the ingestion fails.
    pub rollback_paths: Vec<PathBuf>,
    /// `(backup, canonical)` for a stale directory renamed aside; it is
    /// renamed back if the ingestion fails.
    pub moved_aside: Option<(PathBuf, PathBuf)>,

    /// Set by the first failing stage.
    pub failure: Option<IngestError>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(request: IngestRequest, upload_id: String) -> Self {
        Self {
            request,
            id: upload_id.clone(),
            upload_id,
            archive_path: None,
            source_url: None,
            payload_path: None,
            is_bag: false,
            is_compendium: false,
            config_path: None,
            text_files: Vec::new(),
            metadata_dir: None,
            metadata: Value::Object(serde_json::Map::new()),
            rollback_paths: Vec::new(),
            moved_aside: None,
            failure: None,
            warnings: Vec::new(),
        }
    }

    pub fn raw_metadata(&self) -> Option<&Value> {
        self.metadata.get("raw")
    }

    pub fn warn(&mut self, warning: PipelineWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}
