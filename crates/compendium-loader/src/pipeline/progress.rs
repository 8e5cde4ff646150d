use super::stage::Stage;

/// Events emitted by the pipeline while an ingestion runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted { stage: Stage },
    Completed { id: String },
    /// Carries the caller-facing message only.
    Failed { stage: Stage, error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that drops every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}
