//! Typed errors for the timing core and the pipeline orchestrator.
//!
//! Collaborator calls and I/O use `anyhow`; these enums cover the places
//! where callers need to match on what went wrong.

use thiserror::Error;

use crate::pipeline::stage::Stage;

/// Structurally invalid input to one of the pure components.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("word '{word}' ends before it starts ({start:.3}s > {end:.3}s)")]
    EndBeforeStart { word: String, start: f64, end: f64 },

    #[error("word '{word}' has confidence {confidence} outside [0, 1]")]
    ConfidenceOutOfRange { word: String, confidence: f64 },

    #[error("word {index} starts at {start:.3}s, before the previous word ({previous:.3}s)")]
    OutOfOrder { index: usize, start: f64, previous: f64 },

    #[error("word '{word}' has a non-finite timestamp")]
    NonFinite { word: String },

    #[error("caption segment has no words")]
    EmptySegment,

    #[error("fixed-size segmentation needs a group size of at least 1")]
    ZeroGroupSize,

    #[error("background source duration must be positive, got {0}")]
    NonPositiveSourceDuration(f64),

    #[error("target duration must be positive, got {0}")]
    NonPositiveTargetDuration(f64),

    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("invalid story id '{0}'")]
    InvalidStoryId(String),
}

/// Why a story's pipeline run did not produce an output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("story {story_id}: {stage} failed: {detail}")]
    StageFailed {
        story_id: String,
        stage: Stage,
        detail: String,
    },

    #[error("story {story_id}: cancelled before {next_stage}")]
    Cancelled { story_id: String, next_stage: Stage },

    #[error("invalid story: {0}")]
    Invalid(#[from] ValidationError),

    #[error("artifact store error: {0:#}")]
    Store(anyhow::Error),
}

impl PipelineError {
    /// The stage that failed, if the run stopped on a stage failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
