//! Narrated short-form video pipeline.
//!
//! A story is simplified, narrated, transcribed into word timings, paired
//! with a background clip, and rendered with karaoke captions. The timing
//! core (`types`, `captions`, `background::plan`) is pure; the `pipeline`
//! drives external collaborators and persists per-stage artifacts so runs
//! can resume.

pub mod background;
pub mod captions;
pub mod config;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod render;
pub mod story;
pub mod transcript;
pub mod tts;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, ValidationError};
pub use pipeline::{Pipeline, Stage};
pub use story::{ProcessedStory, Story};
pub use types::{CaptionSegment, KaraokeFrame, Timed, Transcript, WordTiming};
