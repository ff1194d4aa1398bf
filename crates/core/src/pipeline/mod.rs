//! Staged story pipeline with resumable artifacts.

pub mod artifacts;
pub mod batch;
pub mod collaborators;
pub mod orchestrator;
pub mod stage;
pub mod timeout;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactRecord, ArtifactStatus, ArtifactStore};
pub use batch::StoryOutcome;
pub use collaborators::Collaborators;
pub use orchestrator::{CancelToken, Pipeline, RunOptions};
pub use stage::Stage;
