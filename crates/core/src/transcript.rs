//! Transcript persistence and the estimated-timing fallback.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::ValidationError;
use crate::paths::{read_json, write_json};
use crate::types::{Transcript, WordTiming};

/// Confidence assigned to estimated word timings.
pub const ESTIMATED_CONFIDENCE: f64 = 0.5;

/// Save a transcript as pretty JSON.
pub fn save_transcript(path: &Path, transcript: &Transcript) -> Result<()> {
    write_json(path, transcript)
}

/// Load a transcript saved by [`save_transcript`]. Invariants are checked
/// again on load.
pub fn load_transcript(path: &Path) -> Result<Transcript> {
    read_json(path)?.with_context(|| format!("Transcript not found: {}", path.display()))
}

/// Evenly spaced word timings for when no transcriber is available.
///
/// Words of `text` share `audio_duration` equally. Without a usable audio
/// duration the length is estimated from `words_per_minute` instead.
pub fn estimate_word_timings(
    text: &str,
    audio_duration: f64,
    words_per_minute: f64,
    language: &str,
) -> Result<Transcript, ValidationError> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Transcript::empty(audio_duration.max(0.0), language));
    }

    let total = if audio_duration > 0.0 {
        audio_duration
    } else {
        words.len() as f64 * 60.0 / words_per_minute
    };
    let n = words.len() as f64;

    let timings = words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            // Index-based so rounding never accumulates across the text.
            let start = total * i as f64 / n;
            let end = total * (i + 1) as f64 / n;
            WordTiming::new(*w, start, end, ESTIMATED_CONFIDENCE)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Transcript::new(timings, total, language)
}
