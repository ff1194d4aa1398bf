//! Speech synthesis through a local TTS program such as Piper.
//!
//! The text is piped to the program's stdin and the program writes a WAV
//! file; the narration duration is then read from the WAV header.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use hound::WavReader;

use crate::pipeline::collaborators::{SynthesisRequest, SynthesizedAudio, Synthesizer};
use crate::process::wait_until;

/// Duration of a WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let spec = reader.spec();
    let frames = reader.len() as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Parse a rate adjustment such as "+10%" or "-25%" into a speed factor
/// (1.1, 0.75).
pub fn parse_rate(rate: &str) -> Result<f64> {
    let trimmed = rate.trim();
    let number = trimmed
        .strip_suffix('%')
        .with_context(|| format!("Speech rate must end in '%': {rate}"))?;
    let percent: f64 = number
        .trim_start_matches('+')
        .parse()
        .with_context(|| format!("Invalid speech rate: {rate}"))?;
    let factor = 1.0 + percent / 100.0;
    if factor <= 0.0 {
        bail!("Speech rate {rate} would stop speech entirely");
    }
    Ok(factor)
}

/// Runs `<program> --model <model> --output_file <path>` per request.
///
/// The request's voice is looked up in `voices`; an unmapped voice is
/// passed to `--model` as is, which suits Piper voice names such as
/// `en_US-lessac-medium` and direct `.onnx` paths.
pub struct CommandSynthesizer {
    pub program: PathBuf,
    /// Voice name to model file.
    pub voices: BTreeMap<String, PathBuf>,
    /// Appended after the generated arguments.
    pub extra_args: Vec<String>,
}

impl Default for CommandSynthesizer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("piper"),
            voices: BTreeMap::new(),
            extra_args: Vec::new(),
        }
    }
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Map `voice` to the model file for it.
    pub fn with_voice(mut self, voice: impl Into<String>, model: impl Into<PathBuf>) -> Self {
        self.voices.insert(voice.into(), model.into());
        self
    }

    /// Value passed to `--model` for `voice`.
    pub fn model_for(&self, voice: &str) -> String {
        match self.voices.get(voice) {
            Some(model) => model.to_string_lossy().into_owned(),
            None => voice.to_string(),
        }
    }

    pub fn build_args(&self, request: &SynthesisRequest) -> Result<Vec<String>> {
        let mut args = vec![
            "--model".to_string(),
            self.model_for(&request.voice),
            "--output_file".to_string(),
            request.output.to_string_lossy().into_owned(),
        ];
        let speed = parse_rate(&request.rate)?;
        if (speed - 1.0).abs() > f64::EPSILON {
            // Piper stretches phoneme length, the inverse of speed.
            args.push("--length_scale".to_string());
            args.push(format!("{:.3}", 1.0 / speed));
        }
        args.extend(self.extra_args.iter().cloned());
        Ok(args)
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedAudio> {
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let args = self.build_args(request)?;
        log::info!(
            "Calling {} for output file {}",
            self.program.display(),
            request.output.display()
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        // Dropping stdin closes it so the program sees end of input.
        {
            let mut stdin = child.stdin.take().context("Failed to open TTS stdin")?;
            stdin
                .write_all(request.text.as_bytes())
                .context("Failed to send text to TTS program")?;
        }

        let finished = wait_until(child, request.deadline, "TTS program")?;
        if !finished.status.success() {
            bail!(
                "TTS program exited with {}: {}",
                finished.status,
                finished.stderr.trim()
            );
        }

        let duration = wav_duration(&request.output)?;
        Ok(SynthesizedAudio {
            locator: request.output.clone(),
            duration,
        })
    }
}
