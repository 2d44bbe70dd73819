//! Pipeline progress events.
//!
//! The orchestrator emits one [`PipelineEvent`] per stage transition and
//! progress tick. Rendering is left to the application (stderr lines or
//! JSON); the core only defines the event shape and the reporter trait.

use crate::error::StageId;

/// A single progress event for one ingestion unit.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    StageStarted {
        unit: String,
        stage: StageId,
    },
    /// `percent` is monotonic within a stage.
    StageProgress {
        unit: String,
        stage: StageId,
        percent: u8,
    },
    /// `count` is the number of records the stage produced.
    StageCompleted {
        unit: String,
        stage: StageId,
        count: usize,
    },
    StageFailed {
        unit: String,
        stage: StageId,
        error: String,
    },
    /// The unit was recognised as a duplicate; no stage ran.
    Skipped { unit: String, reason: String },
}

impl PipelineEvent {
    pub fn unit(&self) -> &str {
        match self {
            PipelineEvent::StageStarted { unit, .. }
            | PipelineEvent::StageProgress { unit, .. }
            | PipelineEvent::StageCompleted { unit, .. }
            | PipelineEvent::StageFailed { unit, .. }
            | PipelineEvent::Skipped { unit, .. } => unit,
        }
    }
}

/// Receives pipeline events. Implementations must not fail the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: PipelineEvent);
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}
