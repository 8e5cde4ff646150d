pub mod archive;
pub mod bagit;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod pipeline;
pub mod sandbox;
pub mod sanitize;
pub mod source;
pub mod storage;
pub mod telemetry;

pub use config::{load_config, LoaderConfig};
pub use db::Database;
pub use error::{ArchiveError, ConfigError, LoaderError, Result, SandboxError, StorageError};
pub use pipeline::{IngestError, IngestRequest, IngestSuccess, Pipeline, PipelineContext};
pub use source::{SourceDescriptor, SourceError};
