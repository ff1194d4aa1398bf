//! What the Assemble stage hands to a renderer.

pub mod ffmpeg;

use std::path::PathBuf;
use std::time::Instant;

use crate::background::BackgroundSelection;
use crate::config::CaptionAppearance;
use crate::types::{CaptionSegment, KaraokeFrame};

pub use ffmpeg::FfmpegRenderer;

/// Timed caption instructions, independent of any layout.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionTrack {
    /// One frame per word, current word highlighted.
    Karaoke(Vec<KaraokeFrame>),
    /// One block per segment, no highlight.
    Segments(Vec<CaptionSegment>),
}

impl CaptionTrack {
    pub fn is_empty(&self) -> bool {
        match self {
            CaptionTrack::Karaoke(frames) => frames.is_empty(),
            CaptionTrack::Segments(segments) => segments.is_empty(),
        }
    }
}

/// Everything needed to produce one video.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub story_id: String,
    pub background: BackgroundSelection,
    pub captions: CaptionTrack,
    pub appearance: CaptionAppearance,
    /// Narration audio.
    pub audio: PathBuf,
    /// Scratch directory the renderer may write helper files into.
    pub work_dir: PathBuf,
    /// Where the video must be written.
    pub output: PathBuf,
    pub fps: u32,
    /// Kill any spawned program still running at this point.
    pub deadline: Option<Instant>,
}
