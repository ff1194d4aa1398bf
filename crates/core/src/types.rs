use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Anything with a start and end time in seconds.
pub trait Timed {
    fn start_time(&self) -> f64;
    fn end_time(&self) -> f64;

    fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }
}

/// Raw word tuple as it appears on disk, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWordTiming {
    word: String,
    start_time: f64,
    end_time: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// A single spoken word with timing information.
///
/// Only constructible through [`WordTiming::new`] (or deserialization,
/// which goes through the same checks), so `end_time >= start_time` and
/// `confidence` in `[0, 1]` always hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWordTiming", into = "RawWordTiming")]
pub struct WordTiming {
    word: String,
    start_time: f64,
    end_time: f64,
    confidence: f64,
}

impl WordTiming {
    /// Surrounding whitespace in `word` is trimmed; recognizers often emit
    /// words with a leading space.
    pub fn new(
        word: impl Into<String>,
        start_time: f64,
        end_time: f64,
        confidence: f64,
    ) -> Result<Self, ValidationError> {
        let word: String = word.into();
        let word = if word.trim().len() == word.len() {
            word
        } else {
            word.trim().to_string()
        };
        if !start_time.is_finite() || !end_time.is_finite() {
            return Err(ValidationError::NonFinite { word });
        }
        if end_time < start_time {
            return Err(ValidationError::EndBeforeStart {
                word,
                start: start_time,
                end: end_time,
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange { word, confidence });
        }
        Ok(Self {
            word,
            start_time,
            end_time,
            confidence,
        })
    }

    /// Visible text of the word.
    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Copy of this word with both timestamps clamped to `[0, limit]`.
    pub(crate) fn clamped_to(&self, limit: f64) -> Self {
        let start_time = self.start_time.clamp(0.0, limit);
        let end_time = self.end_time.clamp(start_time, limit);
        Self {
            word: self.word.clone(),
            start_time,
            end_time,
            confidence: self.confidence,
        }
    }
}

impl Timed for WordTiming {
    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn end_time(&self) -> f64 {
        self.end_time
    }
}

impl TryFrom<RawWordTiming> for WordTiming {
    type Error = ValidationError;

    fn try_from(raw: RawWordTiming) -> Result<Self, Self::Error> {
        WordTiming::new(raw.word, raw.start_time, raw.end_time, raw.confidence)
    }
}

impl From<WordTiming> for RawWordTiming {
    fn from(w: WordTiming) -> Self {
        Self {
            word: w.word,
            start_time: w.start_time,
            end_time: w.end_time,
            confidence: w.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTranscript {
    words: Vec<WordTiming>,
    duration: f64,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "en".to_string()
}

/// Full transcript with word-level timing.
///
/// Words are ordered by non-decreasing start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTranscript", into = "RawTranscript")]
pub struct Transcript {
    words: Vec<WordTiming>,
    duration: f64,
    language: String,
}

impl Transcript {
    pub fn new(
        words: Vec<WordTiming>,
        duration: f64,
        language: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        for i in 1..words.len() {
            let previous = words[i - 1].start_time;
            if words[i].start_time < previous {
                return Err(ValidationError::OutOfOrder {
                    index: i,
                    start: words[i].start_time,
                    previous,
                });
            }
        }
        Ok(Self {
            words,
            duration,
            language: language.into(),
        })
    }

    /// An empty transcript for `duration` seconds of audio.
    pub fn empty(duration: f64, language: impl Into<String>) -> Self {
        Self {
            words: Vec::new(),
            duration,
            language: language.into(),
        }
    }

    pub fn words(&self) -> &[WordTiming] {
        &self.words
    }

    /// Total audio duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        join_words(&self.words)
    }

    /// End of the last word, or 0 for an empty transcript.
    pub fn last_word_end(&self) -> f64 {
        self.words
            .iter()
            .map(|w| w.end_time)
            .fold(0.0, f64::max)
    }

    /// Fit the transcript to `audio_duration` seconds of audio.
    ///
    /// Word times are clamped into `[0, audio_duration]` and `duration` is
    /// set to the audio duration. Returns the conformed transcript and
    /// whether any word had to be clamped. Clamping is monotone, so word
    /// order is preserved.
    pub fn conform_to(&self, audio_duration: f64) -> (Transcript, bool) {
        let limit = audio_duration.max(0.0);
        let mut clamped = false;
        let words = self
            .words
            .iter()
            .map(|w| {
                let c = w.clamped_to(limit);
                if c != *w {
                    clamped = true;
                }
                c
            })
            .collect();
        (
            Transcript {
                words,
                duration: limit,
                language: self.language.clone(),
            },
            clamped,
        )
    }
}

impl TryFrom<RawTranscript> for Transcript {
    type Error = ValidationError;

    fn try_from(raw: RawTranscript) -> Result<Self, Self::Error> {
        Transcript::new(raw.words, raw.duration, raw.language)
    }
}

impl From<Transcript> for RawTranscript {
    fn from(t: Transcript) -> Self {
        Self {
            words: t.words,
            duration: t.duration,
            language: t.language,
        }
    }
}

/// A contiguous, non-empty run of words shown on screen together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionSegment {
    words: Vec<WordTiming>,
}

impl CaptionSegment {
    pub fn new(words: Vec<WordTiming>) -> Result<Self, ValidationError> {
        if words.is_empty() {
            return Err(ValidationError::EmptySegment);
        }
        Ok(Self { words })
    }

    pub fn words(&self) -> &[WordTiming] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        join_words(&self.words)
    }
}

impl Timed for CaptionSegment {
    fn start_time(&self) -> f64 {
        self.words.first().map(|w| w.start_time).unwrap_or(0.0)
    }

    fn end_time(&self) -> f64 {
        self.words.last().map(|w| w.end_time).unwrap_or(0.0)
    }
}

/// One highlight state within a segment: the full segment text with one
/// word marked, shown over `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KaraokeFrame {
    /// Segment words joined by single spaces.
    pub text: String,
    /// The segment's words, in order. A word may itself contain spaces.
    pub words: Vec<String>,
    /// Index of the highlighted word within `words`.
    pub highlight_index: usize,
    pub start_time: f64,
    pub end_time: f64,
}

impl KaraokeFrame {
    pub fn highlighted_word(&self) -> Option<&str> {
        self.words.get(self.highlight_index).map(String::as_str)
    }
}

impl Timed for KaraokeFrame {
    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn end_time(&self) -> f64 {
        self.end_time
    }
}

fn join_words(words: &[WordTiming]) -> String {
    words
        .iter()
        .map(|w| w.word.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
