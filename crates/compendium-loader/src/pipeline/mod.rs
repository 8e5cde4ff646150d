pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod stage;

pub use config::PipelineConfig;
pub use context::{IngestRequest, PipelineContext};
pub use error::{IngestError, PipelineWarning};
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{response, IngestSuccess, Pipeline};
pub use stage::Stage;
