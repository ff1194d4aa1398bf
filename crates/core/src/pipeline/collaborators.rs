//! External services the pipeline drives.
//!
//! Each one is a blocking call behind a trait; the orchestrator owns
//! timeouts, retries, and fallbacks, so implementations should simply
//! do the work once and report errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

use crate::background::BackgroundSource;
use crate::render::RenderJob;
use crate::types::Transcript;

/// Rewrites story text for narration (typically an LLM).
pub trait Simplifier: Send + Sync {
    fn simplify(&self, text: &str) -> Result<String>;
}

/// Input to a speech synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    /// Rate adjustment such as "+0%" or "-10%".
    pub rate: String,
    /// Where the audio should be written.
    pub output: PathBuf,
    /// Kill any spawned program still running at this point.
    pub deadline: Option<Instant>,
}

/// Synthesized narration.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub locator: PathBuf,
    /// Seconds.
    pub duration: f64,
}

/// Text-to-speech backend.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio>;
}

/// Speech recognizer producing word-level timings.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript>;
}

/// Fetches a new background clip when the library has none left.
pub trait BackgroundProvider: Send + Sync {
    fn acquire(&self) -> Result<BackgroundSource>;
}

/// Turns a [`RenderJob`] into a video file, returning the path written.
pub trait Renderer: Send + Sync {
    fn render(&self, job: &RenderJob) -> Result<PathBuf>;
}

/// The set of collaborators a pipeline is built with.
///
/// `transcriber` is optional: without one, word timings are estimated
/// by spreading the narration text evenly over the audio.
#[derive(Clone)]
pub struct Collaborators {
    pub simplifier: Arc<dyn Simplifier>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub backgrounds: Arc<dyn BackgroundProvider>,
    pub renderer: Arc<dyn Renderer>,
}

/// Simplifier that returns the text unchanged.
pub struct PassthroughSimplifier;

impl Simplifier for PassthroughSimplifier {
    fn simplify(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Provider for setups where every clip is registered up front.
pub struct NoAcquisition;

impl BackgroundProvider for NoAcquisition {
    fn acquire(&self) -> Result<BackgroundSource> {
        anyhow::bail!("No background provider configured and no unused clips left")
    }
}
