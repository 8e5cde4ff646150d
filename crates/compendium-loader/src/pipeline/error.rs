use serde_json::{json, Value};
use thiserror::Error;

use crate::encoding::EncodingViolation;
use crate::error::{ArchiveError, StorageError};
use crate::identity::IdentityError;
use crate::source::SourceError;

pub const CONFLICT_MESSAGE: &str = "Error fetching ID from compendium, ID already exists";
pub const ENCODING_MESSAGE: &str =
    "Files with unsupported encoding detected. Only UTF-8 is supported.";
pub const UNKNOWN_MESSAGE: &str = "Unknown error";

/// Terminal failure of an ingestion.
///
/// `Display` carries diagnostics for the logs; what the caller sees comes
/// from [`IngestError::status`] and [`IngestError::body`] only.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source resolution failed ({status}): {message}")]
    SourceResolution { status: u16, message: String },

    #[error("validation failed ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("compendium '{id}' already exists")]
    Conflict {
        id: String,
        existing_owner: Option<String>,
    },

    #[error("{} file(s) with unsupported encoding", files.len())]
    Encoding { files: Vec<EncodingViolation> },

    #[error("{tool} failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    #[error("{message}: {detail}")]
    Internal { message: String, detail: String },
}

impl IngestError {
    /// A 400 validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        IngestError::Validation {
            status: 400,
            message: message.into(),
        }
    }

    /// A 422 rejection of well-formed but unacceptable input.
    pub fn unprocessable(message: impl Into<String>) -> Self {
        IngestError::Validation {
            status: 422,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        IngestError::Internal {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            IngestError::SourceResolution { status, .. } => *status,
            IngestError::Validation { status, .. } => *status,
            IngestError::Conflict { .. } => 400,
            IngestError::Encoding { .. } => 422,
            IngestError::ExternalTool { .. } => 500,
            IngestError::Internal { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            IngestError::SourceResolution { message, .. } => message.clone(),
            IngestError::Validation { message, .. } => message.clone(),
            IngestError::Conflict { .. } => CONFLICT_MESSAGE.to_string(),
            IngestError::Encoding { .. } => ENCODING_MESSAGE.to_string(),
            IngestError::ExternalTool { tool, .. } => format!("{} failed", tool),
            IngestError::Internal { message, .. } => message.clone(),
        }
    }

    /// Caller-facing JSON body: `{"error": <message>}`, or the structured
    /// file list for encoding rejections.
    pub fn body(&self) -> Value {
        match self {
            IngestError::Encoding { files } => json!({
                "error": {
                    "message": ENCODING_MESSAGE,
                    "files": files,
                }
            }),
            other => json!({ "error": other.user_message() }),
        }
    }
}

impl From<ArchiveError> for IngestError {
    fn from(e: ArchiveError) -> Self {
        let message = format!("extraction failed: {}", e.public_reason());
        match e {
            ArchiveError::Open { .. } | ArchiveError::Write { .. } => {
                IngestError::internal(message, e)
            }
            _ => IngestError::validation(message),
        }
    }
}

impl From<IdentityError> for IngestError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Random(_) => IngestError::internal(UNKNOWN_MESSAGE, e),
            IdentityError::ReadConfig { .. } | IdentityError::ParseConfig(_) => {
                IngestError::validation("Could not read compendium detection file")
            }
            IdentityError::MissingId => {
                IngestError::validation("No id found in compendium detection file")
            }
            IdentityError::InvalidId(_) => {
                IngestError::validation("Invalid id found in compendium detection file")
            }
        }
    }
}

impl From<SourceError> for IngestError {
    fn from(e: SourceError) -> Self {
        IngestError::SourceResolution {
            status: e.status(),
            message: e.public_message().to_string(),
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(e: StorageError) -> Self {
        IngestError::internal(UNKNOWN_MESSAGE, e)
    }
}

/// Non-fatal conditions recorded while a pipeline keeps going.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// The bag failed validation and invalid bags are tolerated.
    InvalidBag { reason: String },
    /// One brokering mapping failed; its siblings were kept.
    BrokerFailed { mapping: String, error: String },
    /// Extraction produced no raw metadata.
    NoMetadata,
    /// Stale data at the canonical location was renamed aside.
    MovedAside { backup: String },
}
