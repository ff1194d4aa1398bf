//! Deterministic on-disk layout and atomic file writes.
//!
//! Everything a story produces lives at a path derived only from the data
//! directory and the story id, so a rerun finds the previous run's files.
//!
//! ```text
//! <data_dir>/
//!   artifacts/<story_id>.json
//!   stories/<story_id>/{processed.json, narration.wav, transcript.json,
//!                       captions.srt, captions.ass, background.json}
//!   output/<story_id>.mp4
//!   backgrounds/index.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ValidationError;

/// Reject ids that could escape the data directory.
pub fn validate_story_id(story_id: &str) -> Result<(), ValidationError> {
    let bad = story_id.is_empty()
        || story_id == "."
        || story_id == ".."
        || story_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        Err(ValidationError::InvalidStoryId(story_id.to_string()))
    } else {
        Ok(())
    }
}

/// Location of the background index.
pub fn background_index(data_dir: &Path) -> PathBuf {
    data_dir.join("backgrounds").join("index.json")
}

/// Locators for one story's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPaths {
    data_dir: PathBuf,
    story_id: String,
}

impl StoryPaths {
    pub fn new(data_dir: impl Into<PathBuf>, story_id: &str) -> Result<Self, ValidationError> {
        validate_story_id(story_id)?;
        Ok(Self {
            data_dir: data_dir.into(),
            story_id: story_id.to_string(),
        })
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    /// Working directory for intermediate files.
    pub fn dir(&self) -> PathBuf {
        self.data_dir.join("stories").join(&self.story_id)
    }

    /// Simplify stage output (a `ProcessedStory`).
    pub fn processed(&self) -> PathBuf {
        self.dir().join("processed.json")
    }

    pub fn narration(&self) -> PathBuf {
        self.dir().join("narration.wav")
    }

    pub fn transcript(&self) -> PathBuf {
        self.dir().join("transcript.json")
    }

    pub fn captions_srt(&self) -> PathBuf {
        self.dir().join("captions.srt")
    }

    pub fn captions_ass(&self) -> PathBuf {
        self.dir().join("captions.ass")
    }

    pub fn background(&self) -> PathBuf {
        self.dir().join("background.json")
    }

    /// The per-story artifact record file.
    pub fn artifacts(&self) -> PathBuf {
        self.data_dir
            .join("artifacts")
            .join(format!("{}.json", self.story_id))
    }

    /// Final video, only present after a successful Assemble.
    pub fn output(&self) -> PathBuf {
        self.data_dir
            .join("output")
            .join(format!("{}.mp4", self.story_id))
    }

    /// Where the renderer writes before the output is published. Kept in
    /// the story's own directory so it never names another story's video.
    pub fn partial_output(&self) -> PathBuf {
        self.dir().join("render.partial.mp4")
    }
}

/// Atomically write data to a file via a temp file in the same directory.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).context("Failed to create temp file")?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    tmp.persist(target)
        .map_err(|e| anyhow::anyhow!("Failed to save {}: {}", target.display(), e))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", target.display()))?;
    atomic_write(target, json.as_bytes())
}

/// Read a JSON file, or `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}
