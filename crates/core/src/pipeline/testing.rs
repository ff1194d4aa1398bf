//! In-memory collaborators for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::background::BackgroundSource;
use crate::config::PipelineConfig;
use crate::pipeline::collaborators::{
    BackgroundProvider, Collaborators, Renderer, Simplifier, SynthesisRequest, SynthesizedAudio,
    Synthesizer, Transcriber,
};
use crate::pipeline::orchestrator::Pipeline;
use crate::render::{CaptionTrack, RenderJob};
use crate::types::{Transcript, WordTiming};

pub const NARRATION_SECONDS: f64 = 2.0;
pub const CLIP_SECONDS: f64 = 10.0;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
pub struct Calls {
    pub simplify: AtomicUsize,
    pub synthesize: AtomicUsize,
    pub transcribe: AtomicUsize,
    pub acquire: AtomicUsize,
    pub render: AtomicUsize,
}

impl Calls {
    /// `[simplify, synthesize, transcribe, acquire, render]`
    pub fn snapshot(&self) -> [usize; 5] {
        [
            self.simplify.load(Ordering::SeqCst),
            self.synthesize.load(Ordering::SeqCst),
            self.transcribe.load(Ordering::SeqCst),
            self.acquire.load(Ordering::SeqCst),
            self.render.load(Ordering::SeqCst),
        ]
    }
}

/// One fake standing in for every collaborator.
#[derive(Default)]
pub struct Fakes {
    pub calls: Calls,
    pub simplify_fails: bool,
    pub synthesize_fails: bool,
    pub transcribe_fails: bool,
    pub acquire_fails: bool,
    /// Acquired clips report a zero duration.
    pub acquire_unusable: bool,
    pub render_fails: bool,
    pub render_delay: Duration,
    /// Word timings returned by the transcriber run past the narration.
    pub overlong_transcript: bool,
    pub clip_dir: PathBuf,
    pub last_track: Mutex<Option<CaptionTrack>>,
}

impl Fakes {
    pub fn new(clip_dir: &Path) -> Self {
        Self {
            clip_dir: clip_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn collaborators(self: &Arc<Self>, with_transcriber: bool) -> Collaborators {
        Collaborators {
            simplifier: self.clone(),
            synthesizer: self.clone(),
            transcriber: if with_transcriber {
                Some(self.clone() as Arc<dyn Transcriber>)
            } else {
                None
            },
            backgrounds: self.clone(),
            renderer: self.clone(),
        }
    }

    pub fn pipeline(self: &Arc<Self>, config: PipelineConfig) -> Pipeline {
        init_logs();
        Pipeline::new(config, self.collaborators(true)).unwrap()
    }
}

impl Simplifier for Fakes {
    fn simplify(&self, text: &str) -> Result<String> {
        self.calls.simplify.fetch_add(1, Ordering::SeqCst);
        if self.simplify_fails {
            bail!("llm unavailable");
        }
        Ok(format!("Here's the rewritten story: {text}"))
    }
}

impl Synthesizer for Fakes {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        if self.synthesize_fails {
            bail!("voice model missing");
        }
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.output, request.text.as_bytes())?;
        Ok(SynthesizedAudio {
            locator: request.output.clone(),
            duration: NARRATION_SECONDS,
        })
    }
}

impl Transcriber for Fakes {
    fn transcribe(&self, _audio: &Path, language: &str) -> Result<Transcript> {
        self.calls.transcribe.fetch_add(1, Ordering::SeqCst);
        if self.transcribe_fails {
            bail!("recognizer crashed");
        }
        let last_end = if self.overlong_transcript { 2.6 } else { 1.9 };
        let words = vec![
            WordTiming::new("Hello", 0.0, 0.5, 0.9)?,
            WordTiming::new("world.", 0.5, 1.0, 0.9)?,
            WordTiming::new("Bye.", 1.0, last_end, 0.8)?,
        ];
        Ok(Transcript::new(words, last_end, language)?)
    }
}

impl BackgroundProvider for Fakes {
    fn acquire(&self) -> Result<BackgroundSource> {
        let n = self.calls.acquire.fetch_add(1, Ordering::SeqCst) + 1;
        if self.acquire_fails {
            bail!("download refused");
        }
        std::fs::create_dir_all(&self.clip_dir)?;
        let locator = self.clip_dir.join(format!("acquired{n}.mp4"));
        std::fs::write(&locator, b"clip")?;
        Ok(BackgroundSource {
            id: format!("acquired{n}"),
            locator,
            duration: if self.acquire_unusable { 0.0 } else { CLIP_SECONDS },
            width: 1920,
            height: 1080,
            title: None,
        })
    }
}

impl Renderer for Fakes {
    fn render(&self, job: &RenderJob) -> Result<PathBuf> {
        self.calls.render.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.render_delay);
        std::fs::write(&job.output, b"partial video")?;
        if self.render_fails {
            bail!("encoder crashed");
        }
        if let Ok(mut last) = self.last_track.lock() {
            *last = Some(job.captions.clone());
        }
        Ok(job.output.clone())
    }
}
