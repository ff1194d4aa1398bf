//! Pipeline configuration.
//!
//! Plain data with defaults; embedding applications may deserialize it
//! from JSON (missing fields fall back to the defaults).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::captions::segment::{DEFAULT_GROUP_SIZE, SegmentMode};
use crate::pipeline::stage::Stage;

/// Get the default data directory.
///
/// Uses `REELSMITH_DATA_DIR` env var if set, otherwise
/// `~/.local/share/reelsmith`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REELSMITH_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share").join("reelsmith"),
        Err(_) => PathBuf::from("/tmp/reelsmith"),
    }
}

/// How captions are drawn over the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    /// Whole segment on screen, current word highlighted.
    Karaoke,
    /// Whole segment on screen, no highlight (faster to render).
    Segments,
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
}

/// Caption font and colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionAppearance {
    pub font: String,
    pub bold: bool,
    pub font_size: u32,
    pub color: Rgb,
    pub highlight_color: Rgb,
    pub stroke_color: Rgb,
    pub stroke_width: u32,
    /// Horizontal margin kept free on each side, in pixels.
    pub side_margin: u32,
}

impl Default for CaptionAppearance {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            bold: true,
            font_size: 60,
            color: Rgb::WHITE,
            highlight_color: Rgb::YELLOW,
            stroke_color: Rgb::BLACK,
            stroke_width: 3,
            side_margin: 40,
        }
    }
}

/// Upper bound on each stage's external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub simplify: Duration,
    pub synthesize: Duration,
    pub transcribe: Duration,
    pub select_background: Duration,
    pub assemble: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            simplify: Duration::from_secs(120),
            synthesize: Duration::from_secs(300),
            transcribe: Duration::from_secs(600),
            select_background: Duration::from_secs(600),
            assemble: Duration::from_secs(1800),
        }
    }
}

impl StageTimeouts {
    /// The same limit for every stage.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            simplify: limit,
            synthesize: limit,
            transcribe: limit,
            select_background: limit,
            assemble: limit,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Simplify => self.simplify,
            Stage::Synthesize => self.synthesize,
            Stage::Transcribe => self.transcribe,
            Stage::SelectBackground => self.select_background,
            Stage::Assemble => self.assemble,
        }
    }
}

/// Configuration for a story pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root for artifacts, per-story outputs, and the background index.
    pub data_dir: PathBuf,
    pub language: String,
    /// Voice handed to the synthesizer. The default names a Piper voice,
    /// matching the bundled `CommandSynthesizer`; other backends need their
    /// own voice names here.
    pub voice: String,
    /// Speech rate adjustment passed to the synthesizer, e.g. "+10%".
    pub speech_rate: String,
    /// Extra simplify attempts after the first one fails.
    pub simplify_retries: u32,
    /// Speaking rate assumed by the estimated-timing fallback.
    pub words_per_minute: f64,
    pub segment_mode: SegmentMode,
    /// Words per block in the exported SRT file.
    pub srt_group_size: usize,
    pub caption_style: CaptionStyle,
    pub appearance: CaptionAppearance,
    pub output_width: u32,
    pub output_height: u32,
    pub fps: u32,
    /// Seed for background selection; `None` picks from entropy.
    pub background_seed: Option<u64>,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            language: "en".to_string(),
            voice: "en_US-lessac-medium".to_string(),
            speech_rate: "+0%".to_string(),
            simplify_retries: 2,
            words_per_minute: 150.0,
            segment_mode: SegmentMode::FixedSize(DEFAULT_GROUP_SIZE),
            srt_group_size: DEFAULT_GROUP_SIZE,
            caption_style: CaptionStyle::Karaoke,
            appearance: CaptionAppearance::default(),
            output_width: 1080,
            output_height: 1920,
            fps: 30,
            background_seed: None,
            timeouts: StageTimeouts::default(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}
