//! Stories and the output of the Simplify stage.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Assumed narration speed for duration estimates.
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Boilerplate some models put in front of their answer.
const RESPONSE_PREFIXES: &[&str] = &[
    "Here's the rewritten story:",
    "Here is the rewritten story:",
    "REWRITTEN STORY:",
    "Rewritten story:",
    "REWRITTEN:",
];

/// A unit of source text to turn into a narrated video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Where the story came from (subreddit, URL, ...), informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Story {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            source: None,
        }
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    /// Rough narration length in seconds.
    pub fn estimated_duration(&self) -> f64 {
        self.word_count() as f64 / WORDS_PER_MINUTE * 60.0
    }

    /// SHA-256 of title and body as a 64-character hex string.
    ///
    /// Stored with the artifacts so an edited story is not resumed from
    /// stale outputs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.body.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Narration text chosen by the Simplify stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedStory {
    pub story_id: String,
    pub text: String,
    /// False when the simplifier gave up and `text` is the original body.
    pub simplified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_note: Option<String>,
}

impl ProcessedStory {
    pub fn simplified(story: &Story, text: String) -> Self {
        Self {
            story_id: story.id.clone(),
            text,
            simplified: true,
            error_note: None,
        }
    }

    /// Keep the original body after every simplify attempt failed.
    pub fn fallback(story: &Story, last_error: &str) -> Self {
        Self {
            story_id: story.id.clone(),
            text: story.body.clone(),
            simplified: false,
            error_note: Some(format!(
                "simplification failed, using original text: {last_error}"
            )),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Strip boilerplate prefixes and wrapping quotes from a model reply.
pub fn clean_simplified_text(reply: &str) -> String {
    let mut text = reply.trim();
    for prefix in RESPONSE_PREFIXES {
        let matches = text
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            text = text[prefix.len()..].trim();
        }
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = &text[1..text.len() - 1];
    }
    text.trim().to_string()
}
