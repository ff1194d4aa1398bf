//! Runs one story through the stage sequence.
//!
//! Simplify -> Synthesize -> Transcribe -> SelectBackground -> Assemble,
//! strictly in order. Every stage reads its inputs from the artifact
//! records of earlier stages, so a run can stop anywhere and a later run
//! picks up after the last completed stage.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use crate::background::{BackgroundLibrary, BackgroundSelection};
use crate::captions::{karaoke, segment, srt};
use crate::config::{CaptionStyle, PipelineConfig};
use crate::error::PipelineError;
use crate::paths::{StoryPaths, atomic_write, read_json, write_json};
use crate::pipeline::artifacts::{ArtifactRecord, ArtifactStore};
use crate::pipeline::collaborators::{Collaborators, SynthesisRequest};
use crate::pipeline::stage::Stage;
use crate::pipeline::timeout::run_with_timeout;
use crate::render::{CaptionTrack, RenderJob};
use crate::story::{ProcessedStory, Story, clean_simplified_text};
use crate::transcript::{estimate_word_timings, load_transcript, save_transcript};

/// Best-effort cancellation, observed between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Rerun this stage and everything after it even if already done.
    pub force_from: Option<Stage>,
    pub cancel: CancelToken,
}

impl RunOptions {
    /// Ignore every stored result.
    pub fn forced() -> Self {
        Self {
            force_from: Some(Stage::Simplify),
            ..Self::default()
        }
    }
}

struct StageOutput {
    locator: PathBuf,
    note: Option<String>,
    data: serde_json::Value,
}

impl StageOutput {
    fn new(locator: PathBuf) -> Self {
        Self {
            locator,
            note: None,
            data: serde_json::Value::Null,
        }
    }
}

/// Story pipeline with its collaborators resolved up front.
pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    store: ArtifactStore,
    backgrounds: BackgroundLibrary,
    rng: Mutex<StdRng>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        let store = ArtifactStore::new(&config.data_dir);
        let backgrounds = BackgroundLibrary::open(&config.data_dir)?;
        let rng = match config.background_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            collaborators,
            store,
            backgrounds,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn backgrounds(&self) -> &BackgroundLibrary {
        &self.backgrounds
    }

    /// Run a story to completion, resuming from stored artifacts.
    pub fn run(&self, story: &Story) -> Result<PathBuf, PipelineError> {
        self.run_with(story, &RunOptions::default())
    }

    pub fn run_with(&self, story: &Story, options: &RunOptions) -> Result<PathBuf, PipelineError> {
        let paths = StoryPaths::new(&self.config.data_dir, &story.id)?;
        let id = story.id.as_str();

        if self
            .store
            .ensure_source(id, &story.fingerprint())
            .map_err(PipelineError::Store)?
        {
            log::info!("Story {} changed since its last run, starting over", id);
        }
        if let Some(stage) = options.force_from {
            log::info!("Forcing {} to rerun from {}", id, stage);
            self.store.reset_from(id, stage).map_err(PipelineError::Store)?;
        }

        let mut last_locator = None;
        for (i, stage) in Stage::ALL.into_iter().enumerate() {
            if options.cancel.is_cancelled() {
                log::warn!("Story {} cancelled before {}", id, stage);
                return Err(PipelineError::Cancelled {
                    story_id: id.to_string(),
                    next_stage: stage,
                });
            }

            if let Some(locator) = self.completed(id, stage)? {
                log::debug!("Skipping {} for {}: already done", stage, id);
                last_locator = Some(locator);
                continue;
            }

            log::info!("Step {}/{}: {} ({})", i + 1, Stage::ALL.len(), stage, id);
            self.store.begin(id, stage).map_err(PipelineError::Store)?;

            match self.run_stage(stage, story, &paths) {
                Ok(out) => {
                    if let Some(note) = &out.note {
                        log::warn!("{} for {}: {}", stage, id, note);
                    }
                    self.store
                        .finish_done(id, stage, out.locator.clone(), out.note, out.data)
                        .map_err(PipelineError::Store)?;
                    last_locator = Some(out.locator);
                }
                Err(e) => {
                    let detail = format!("{e:#}");
                    log::error!("Story {}: {} failed: {}", id, stage, detail);
                    self.store
                        .finish_failed(id, stage, detail.clone())
                        .map_err(PipelineError::Store)?;
                    return Err(PipelineError::StageFailed {
                        story_id: id.to_string(),
                        stage,
                        detail,
                    });
                }
            }
        }

        last_locator.ok_or_else(|| PipelineError::Store(anyhow::anyhow!("no stages ran for {id}")))
    }

    /// Locator of a finished stage whose output is still on disk.
    fn completed(&self, id: &str, stage: Stage) -> Result<Option<PathBuf>, PipelineError> {
        let record = self.store.get(id, stage).map_err(PipelineError::Store)?;
        match record {
            Some(r) if r.is_done() => match r.locator {
                Some(locator) if locator.exists() => Ok(Some(locator)),
                _ => {
                    log::warn!("{} for {} is marked done but its output is gone, rerunning", stage, id);
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    fn run_stage(&self, stage: Stage, story: &Story, paths: &StoryPaths) -> Result<StageOutput> {
        match stage {
            Stage::Simplify => self.simplify(story, paths),
            Stage::Synthesize => self.synthesize(paths),
            Stage::Transcribe => self.transcribe(paths),
            Stage::SelectBackground => self.select_background(paths),
            Stage::Assemble => self.assemble(paths),
        }
    }

    fn done_record(&self, id: &str, stage: Stage) -> Result<ArtifactRecord> {
        self.store
            .get(id, stage)?
            .filter(ArtifactRecord::is_done)
            .with_context(|| format!("No completed {stage} output for {id}"))
    }

    fn input(&self, id: &str, stage: Stage) -> Result<PathBuf> {
        self.done_record(id, stage)?
            .locator
            .with_context(|| format!("{stage} record for {id} has no locator"))
    }

    fn processed(&self, id: &str) -> Result<ProcessedStory> {
        let path = self.input(id, Stage::Simplify)?;
        read_json(&path)?.with_context(|| format!("Missing simplified story {}", path.display()))
    }

    /// Narration audio and its duration in seconds.
    fn narration(&self, id: &str) -> Result<(PathBuf, f64)> {
        let record = self.done_record(id, Stage::Synthesize)?;
        let duration = record
            .data
            .get("duration")
            .and_then(serde_json::Value::as_f64)
            .with_context(|| format!("Synthesize record for {id} has no duration"))?;
        let locator = record
            .locator
            .with_context(|| format!("Synthesize record for {id} has no locator"))?;
        Ok((locator, duration))
    }

    fn simplify(&self, story: &Story, paths: &StoryPaths) -> Result<StageOutput> {
        let attempts = self.config.simplify_retries + 1;
        let limit = self.config.timeouts.for_stage(Stage::Simplify);
        let mut last_error = String::new();
        let mut processed = None;

        for attempt in 1..=attempts {
            let simplifier = Arc::clone(&self.collaborators.simplifier);
            let body = story.body.clone();
            match run_with_timeout(Stage::Simplify, limit, move || simplifier.simplify(&body)) {
                Ok(reply) => {
                    let text = clean_simplified_text(&reply);
                    if text.is_empty() {
                        last_error = "simplifier returned no text".to_string();
                        log::warn!("Attempt {}/{} failed: {}", attempt, attempts, last_error);
                        continue;
                    }
                    log::info!(
                        "Simplified story: {} -> {} words",
                        story.word_count(),
                        text.split_whitespace().count()
                    );
                    processed = Some(ProcessedStory::simplified(story, text));
                    break;
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    log::warn!("Attempt {}/{} failed: {}", attempt, attempts, last_error);
                }
            }
        }

        let processed = match processed {
            Some(p) => p,
            None => {
                log::error!("Failed to simplify story {}, using original text", story.id);
                ProcessedStory::fallback(story, &last_error)
            }
        };

        let locator = paths.processed();
        write_json(&locator, &processed)?;
        Ok(StageOutput {
            note: processed.error_note.clone(),
            data: json!({ "simplified": processed.simplified }),
            ..StageOutput::new(locator)
        })
    }

    fn synthesize(&self, paths: &StoryPaths) -> Result<StageOutput> {
        let processed = self.processed(paths.story_id())?;
        std::fs::create_dir_all(paths.dir())
            .with_context(|| format!("Failed to create {}", paths.dir().display()))?;

        let limit = self.config.timeouts.for_stage(Stage::Synthesize);
        let request = SynthesisRequest {
            text: processed.text,
            voice: self.config.voice.clone(),
            rate: self.config.speech_rate.clone(),
            output: paths.narration(),
            deadline: Instant::now().checked_add(limit),
        };
        let synthesizer = Arc::clone(&self.collaborators.synthesizer);
        let audio = run_with_timeout(Stage::Synthesize, limit, move || {
            synthesizer.synthesize(&request)
        })?;

        if !audio.duration.is_finite() || audio.duration <= 0.0 {
            bail!("Synthesizer reported an invalid duration: {}", audio.duration);
        }
        if !audio.locator.exists() {
            bail!("Synthesized audio not found: {}", audio.locator.display());
        }
        log::info!("Narration: {:.1}s at {}", audio.duration, audio.locator.display());

        Ok(StageOutput {
            data: json!({ "duration": audio.duration }),
            ..StageOutput::new(audio.locator)
        })
    }

    fn transcribe(&self, paths: &StoryPaths) -> Result<StageOutput> {
        let id = paths.story_id();
        let (audio, duration) = self.narration(id)?;
        let mut notes = Vec::new();

        let transcript = match &self.collaborators.transcriber {
            Some(transcriber) => {
                let transcriber = Arc::clone(transcriber);
                let language = self.config.language.clone();
                let limit = self.config.timeouts.for_stage(Stage::Transcribe);
                let raw = run_with_timeout(Stage::Transcribe, limit, move || {
                    transcriber.transcribe(&audio, &language)
                })?;
                let (conformed, clamped) = raw.conform_to(duration);
                if clamped {
                    notes.push(format!(
                        "word timings clamped to the {duration:.3}s narration"
                    ));
                }
                conformed
            }
            None => {
                log::info!("No transcriber configured, estimating word timings");
                let processed = self.processed(id)?;
                notes.push("estimated word timings".to_string());
                estimate_word_timings(
                    &processed.text,
                    duration,
                    self.config.words_per_minute,
                    &self.config.language,
                )?
            }
        };
        if transcript.is_empty() {
            notes.push("transcript has no words, video will have no captions".to_string());
        }
        log::info!("Transcript: {} words", transcript.len());

        let locator = paths.transcript();
        save_transcript(&locator, &transcript)?;
        let subtitles = srt::to_srt(&transcript, self.config.srt_group_size)?;
        atomic_write(&paths.captions_srt(), subtitles.as_bytes())?;

        Ok(StageOutput {
            note: (!notes.is_empty()).then(|| notes.join("; ")),
            data: json!({ "words": transcript.len() }),
            ..StageOutput::new(locator)
        })
    }

    fn select_background(&self, paths: &StoryPaths) -> Result<StageOutput> {
        let (_, target) = self.narration(paths.story_id())?;
        let (width, height) = (self.config.output_width, self.config.output_height);

        let selection = loop {
            let candidate = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                self.backgrounds.take_unused(&mut *rng)?
            };
            match candidate {
                Some(source) => {
                    let source_id = source.id.clone();
                    match BackgroundSelection::for_source(source, target, width, height) {
                        Ok(selection) => break selection,
                        // Already marked used, so it is not offered again.
                        Err(e) => log::warn!("Skipping background {}: {}", source_id, e),
                    }
                }
                None => {
                    log::info!("No unused backgrounds left, acquiring a new one");
                    let provider = Arc::clone(&self.collaborators.backgrounds);
                    let limit = self.config.timeouts.for_stage(Stage::SelectBackground);
                    let source = run_with_timeout(Stage::SelectBackground, limit, move || {
                        provider.acquire()
                    })
                    .context("Background acquisition failed")?;
                    self.backgrounds.register(source.clone())?;
                    self.backgrounds.mark_used(&source.id)?;
                    break BackgroundSelection::for_source(source, target, width, height)
                        .context("Acquired background is unusable")?;
                }
            }
        };

        log::info!(
            "Background {}: {:.1}s source, {} loops, crop {}x{}",
            selection.source.id,
            selection.plan.source_duration,
            selection.plan.loop_count,
            selection.plan.crop.width,
            selection.plan.crop.height
        );

        let locator = paths.background();
        write_json(&locator, &selection)?;
        Ok(StageOutput {
            data: json!({
                "source": selection.source.id,
                "loop_count": selection.plan.loop_count,
            }),
            ..StageOutput::new(locator)
        })
    }

    fn assemble(&self, paths: &StoryPaths) -> Result<StageOutput> {
        let id = paths.story_id();
        let transcript = load_transcript(&self.input(id, Stage::Transcribe)?)?;
        let background_path = self.input(id, Stage::SelectBackground)?;
        let background: BackgroundSelection = read_json(&background_path)?
            .with_context(|| format!("Missing background selection {}", background_path.display()))?;
        let (audio, _) = self.narration(id)?;

        let segments = segment::segment(&transcript, self.config.segment_mode)?;
        let captions = match self.config.caption_style {
            CaptionStyle::Karaoke => {
                CaptionTrack::Karaoke(karaoke::build_schedules(&segments, transcript.duration())?)
            }
            CaptionStyle::Segments => CaptionTrack::Segments(segments),
        };

        let output = paths.output();
        let partial = paths.partial_output();
        discard(&partial);
        for path in [&partial, &output] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let limit = self.config.timeouts.for_stage(Stage::Assemble);
        let job = RenderJob {
            story_id: id.to_string(),
            background,
            captions,
            appearance: self.config.appearance.clone(),
            audio,
            work_dir: paths.dir(),
            output: partial.clone(),
            fps: self.config.fps,
            deadline: Instant::now().checked_add(limit),
        };
        let renderer = Arc::clone(&self.collaborators.renderer);
        let rendered = match run_with_timeout(Stage::Assemble, limit, move || renderer.render(&job)) {
            Ok(path) => path,
            Err(e) => {
                discard(&partial);
                return Err(e);
            }
        };
        if !rendered.exists() {
            discard(&partial);
            bail!("Renderer reported {} but no file was written", rendered.display());
        }

        std::fs::rename(&rendered, &output).with_context(|| {
            format!("Failed to move {} to {}", rendered.display(), output.display())
        })?;
        discard(&partial);
        log::info!("Wrote {}", output.display());
        Ok(StageOutput::new(output))
    }
}

/// Remove a scratch file, ignoring a file that is already gone.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundSource;
    use crate::config::StageTimeouts;
    use crate::pipeline::artifacts::ArtifactStatus;
    use crate::pipeline::collaborators::NoAcquisition;
    use crate::pipeline::testing::{CLIP_SECONDS, Fakes, NARRATION_SECONDS};
    use std::time::Duration;

    fn story() -> Story {
        Story::new("s1", "AITA", "It was a dark night. Then it rained.")
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            background_seed: Some(1),
            ..PipelineConfig::with_data_dir(dir.join("data"))
        }
    }

    fn fakes(dir: &Path) -> Arc<Fakes> {
        Arc::new(Fakes::new(&dir.join("clips")))
    }

    #[test]
    fn test_full_run_produces_output() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));

        let out = pipeline.run(&story()).unwrap();
        assert_eq!(out, dir.path().join("data").join("output").join("s1.mp4"));
        assert!(out.exists());
        assert!(!dir.path().join("data/stories/s1/render.partial.mp4").exists());
        assert_eq!(f.calls.snapshot(), [1, 1, 1, 1, 1]);

        let records = pipeline.store().load("s1").unwrap();
        assert_eq!(records.stages.len(), 5);
        assert!(records.stages.values().all(|r| r.is_done()));

        let stories = dir.path().join("data/stories/s1");
        assert!(stories.join("transcript.json").exists());
        let srt = std::fs::read_to_string(stories.join("captions.srt")).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> "));

        let processed = pipeline.processed("s1").unwrap();
        assert!(processed.simplified);
        assert_eq!(processed.text, story().body);
    }

    #[test]
    fn test_rerun_when_all_done_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));

        let first = pipeline.run(&story()).unwrap();
        let before = f.calls.snapshot();
        let second = pipeline.run(&story()).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.calls.snapshot(), before);
    }

    #[test]
    fn test_simplify_failure_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let f = Arc::new(Fakes {
            simplify_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        });
        let pipeline = f.pipeline(config(dir.path()));

        let out = pipeline.run(&story()).unwrap();
        assert!(out.exists());
        // One attempt plus two retries.
        assert_eq!(f.calls.snapshot()[0], 3);

        let record = pipeline.store().get("s1", Stage::Simplify).unwrap().unwrap();
        assert_eq!(record.status, ArtifactStatus::Done);
        let note = record.note.unwrap();
        assert!(note.starts_with("simplification failed, using original text:"));
        assert!(note.contains("llm unavailable"));

        let processed = pipeline.processed("s1").unwrap();
        assert_eq!(processed.text, story().body);
        assert!(!processed.simplified);
    }

    #[test]
    fn test_render_failure_exposes_no_output_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(Fakes {
            render_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        });
        let pipeline = failing.pipeline(config(dir.path()));

        let err = pipeline.run(&story()).unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Assemble));
        assert!(err.to_string().contains("encoder crashed"));
        assert!(!dir.path().join("data/output/s1.mp4").exists());
        assert!(!dir.path().join("data/stories/s1/render.partial.mp4").exists());

        let record = pipeline.store().get("s1", Stage::Assemble).unwrap().unwrap();
        assert_eq!(record.status, ArtifactStatus::Failed);
        assert!(pipeline
            .store()
            .get("s1", Stage::SelectBackground)
            .unwrap()
            .unwrap()
            .is_done());

        // A fixed renderer only redoes the failed stage.
        let fixed = fakes(dir.path());
        let pipeline = fixed.pipeline(config(dir.path()));
        let out = pipeline.run(&story()).unwrap();
        assert!(out.exists());
        assert_eq!(fixed.calls.snapshot(), [0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_render_timeout_is_a_stage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let f = Arc::new(Fakes {
            render_delay: Duration::from_millis(500),
            ..Fakes::new(&dir.path().join("clips"))
        });
        let mut cfg = config(dir.path());
        cfg.timeouts = StageTimeouts {
            assemble: Duration::from_millis(20),
            ..StageTimeouts::default()
        };
        let pipeline = f.pipeline(cfg);

        let err = pipeline.run(&story()).unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::Assemble));
        assert!(err.to_string().contains("timed out"));
        assert!(!dir.path().join("data/output/s1.mp4").exists());
    }

    #[test]
    fn test_cancelled_before_first_stage() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        let options = RunOptions::default();
        options.cancel.cancel();

        match pipeline.run_with(&story(), &options) {
            Err(PipelineError::Cancelled { next_stage, .. }) => {
                assert_eq!(next_stage, Stage::Simplify)
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(f.calls.snapshot(), [0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_forced_rerun_calls_everything_again() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline.run(&story()).unwrap();
        pipeline.run_with(&story(), &RunOptions::forced()).unwrap();
        assert_eq!(f.calls.snapshot(), [2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_force_from_transcribe_keeps_earlier_stages() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline.run(&story()).unwrap();
        let options = RunOptions {
            force_from: Some(Stage::Transcribe),
            ..RunOptions::default()
        };
        pipeline.run_with(&story(), &options).unwrap();
        assert_eq!(f.calls.snapshot(), [1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_edited_story_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline.run(&story()).unwrap();

        let mut edited = story();
        edited.body.push_str(" The end.");
        pipeline.run(&edited).unwrap();
        assert_eq!(f.calls.snapshot()[0], 2);
    }

    #[test]
    fn test_library_clip_preferred_over_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline
            .backgrounds()
            .register(BackgroundSource {
                id: "stored".into(),
                locator: dir.path().join("stored.mp4"),
                duration: 1.0,
                width: 1080,
                height: 1920,
                title: None,
            })
            .unwrap();

        pipeline.run(&story()).unwrap();
        assert_eq!(f.calls.snapshot()[3], 0);
        let selection: BackgroundSelection = read_json(&dir.path().join("data/stories/s1/background.json"))
            .unwrap()
            .unwrap();
        assert_eq!(selection.source.id, "stored");
        // 1s clip under 2s of narration loops twice.
        assert_eq!(selection.plan.loop_count, 2);
        assert_eq!(selection.plan.trimmed_duration(), NARRATION_SECONDS);
        assert!(pipeline.backgrounds().is_used("stored"));
    }

    #[test]
    fn test_unusable_clip_is_skipped_then_acquired() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline
            .backgrounds()
            .register(BackgroundSource {
                id: "broken".into(),
                locator: dir.path().join("broken.mp4"),
                duration: 0.0,
                width: 1920,
                height: 1080,
                title: None,
            })
            .unwrap();

        pipeline.run(&story()).unwrap();
        assert_eq!(f.calls.snapshot()[3], 1);
        assert!(pipeline.backgrounds().is_used("broken"));
        let selection: BackgroundSelection = read_json(&dir.path().join("data/stories/s1/background.json"))
            .unwrap()
            .unwrap();
        assert_eq!(selection.source.id, "acquired1");
        assert_eq!(selection.plan.source_duration, CLIP_SECONDS);
        assert_eq!(selection.plan.loop_count, 0);
    }

    #[test]
    fn test_estimated_timings_without_transcriber() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = Pipeline::new(config(dir.path()), f.collaborators(false)).unwrap();

        pipeline.run(&story()).unwrap();
        assert_eq!(f.calls.snapshot()[2], 0);
        let record = pipeline.store().get("s1", Stage::Transcribe).unwrap().unwrap();
        assert_eq!(record.note.as_deref(), Some("estimated word timings"));

        let transcript = load_transcript(&record.locator.unwrap()).unwrap();
        assert_eq!(transcript.len(), story().word_count());
        assert_eq!(transcript.last_word_end(), NARRATION_SECONDS);
    }

    #[test]
    fn test_overlong_transcript_is_clamped_and_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let f = Arc::new(Fakes {
            overlong_transcript: true,
            ..Fakes::new(&dir.path().join("clips"))
        });
        let pipeline = f.pipeline(config(dir.path()));

        pipeline.run(&story()).unwrap();
        let record = pipeline.store().get("s1", Stage::Transcribe).unwrap().unwrap();
        assert!(record.note.unwrap().contains("clamped"));
        let transcript = load_transcript(&record.locator.unwrap()).unwrap();
        assert_eq!(transcript.duration(), NARRATION_SECONDS);
        assert!(transcript.last_word_end() <= NARRATION_SECONDS);
    }

    #[test]
    fn test_caption_styles_reach_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        pipeline.run(&story()).unwrap();
        let track = f.last_track.lock().unwrap().take();
        match track {
            Some(CaptionTrack::Karaoke(frames)) => {
                // "Hello world." and "Bye." under the default grouping of 4.
                assert_eq!(frames.len(), 3);
                assert_eq!(frames[0].text, "Hello world. Bye.");
            }
            other => panic!("expected karaoke frames, got {other:?}"),
        }

        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let mut cfg = config(dir.path());
        cfg.caption_style = CaptionStyle::Segments;
        cfg.segment_mode = segment::SegmentMode::Sentence;
        let pipeline = f.pipeline(cfg);
        pipeline.run(&story()).unwrap();
        let track = f.last_track.lock().unwrap().take();
        match track {
            Some(CaptionTrack::Segments(segments)) => assert_eq!(segments.len(), 2),
            other => panic!("expected segments, got {other:?}"),
        }
    }

    /// Run with `failing`, check that `stage` failed and nothing after it
    /// ran, then resume with working fakes.
    fn fail_then_resume(dir: &Path, failing: Fakes, stage: Stage, message: &str) -> [usize; 5] {
        let failing = Arc::new(failing);
        let pipeline = failing.pipeline(config(dir));

        let err = pipeline.run(&story()).unwrap_err();
        assert_eq!(err.failed_stage(), Some(stage));
        assert!(err.to_string().contains(message), "unexpected error: {err}");
        assert!(!dir.join("data/output/s1.mp4").exists());

        let store = pipeline.store();
        let record = store.get("s1", stage).unwrap().unwrap();
        assert_eq!(record.status, ArtifactStatus::Failed);
        assert!(record.error.unwrap().contains(message));
        for earlier in Stage::ALL.into_iter().filter(|s| *s < stage) {
            assert!(store.get("s1", earlier).unwrap().unwrap().is_done());
        }
        for later in stage.downstream() {
            assert!(store.get("s1", later).unwrap().is_none());
        }

        let fixed = fakes(dir);
        let pipeline = fixed.pipeline(config(dir));
        assert!(pipeline.run(&story()).unwrap().exists());
        fixed.calls.snapshot()
    }

    #[test]
    fn test_synthesize_failure_resumes_from_synthesize() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Fakes {
            synthesize_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        };
        let resumed = fail_then_resume(dir.path(), failing, Stage::Synthesize, "voice model missing");
        assert_eq!(resumed, [0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_transcribe_failure_resumes_from_transcribe() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Fakes {
            transcribe_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        };
        let resumed = fail_then_resume(dir.path(), failing, Stage::Transcribe, "recognizer crashed");
        assert_eq!(resumed, [0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_acquisition_failure_with_empty_library() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Fakes {
            acquire_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        };
        let resumed = fail_then_resume(
            dir.path(),
            failing,
            Stage::SelectBackground,
            "Background acquisition failed",
        );
        assert_eq!(resumed, [0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_unusable_acquired_clip_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Fakes {
            acquire_unusable: true,
            ..Fakes::new(&dir.path().join("clips"))
        };
        let resumed = fail_then_resume(
            dir.path(),
            failing,
            Stage::SelectBackground,
            "Acquired background is unusable",
        );
        // The broken clip stays used, so a fresh one is acquired.
        assert_eq!(resumed, [0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_no_provider_and_no_clips_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let collaborators = Collaborators {
            backgrounds: Arc::new(NoAcquisition),
            ..f.collaborators(true)
        };
        let pipeline = Pipeline::new(config(dir.path()), collaborators).unwrap();

        let err = pipeline.run(&story()).unwrap_err();
        assert_eq!(err.failed_stage(), Some(Stage::SelectBackground));
        assert!(err.to_string().contains("no unused clips left"));
        assert_eq!(f.calls.snapshot(), [1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_failed_story_never_touches_other_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        let other = Story::new("s1.partial", "T", "Another story.");
        let published = pipeline.run(&other).unwrap();
        assert_eq!(published, dir.path().join("data/output/s1.partial.mp4"));

        let failing = Arc::new(Fakes {
            render_fails: true,
            ..Fakes::new(&dir.path().join("clips"))
        });
        let pipeline = failing.pipeline(config(dir.path()));
        assert!(pipeline.run(&story()).is_err());
        assert!(published.exists());
    }

    #[test]
    fn test_invalid_story_id() {
        let dir = tempfile::tempdir().unwrap();
        let f = fakes(dir.path());
        let pipeline = f.pipeline(config(dir.path()));
        let bad = Story::new("../x", "t", "b");
        assert!(matches!(pipeline.run(&bad), Err(PipelineError::Invalid(_))));
        assert_eq!(f.calls.snapshot(), [0, 0, 0, 0, 0]);
    }
}
