//! Per-story stage records, persisted so an interrupted run can resume.
//!
//! One pretty-printed JSON file per story (`<data_dir>/artifacts/<id>.json`)
//! maps stage names to `{status, locator, error, ...}`. Every change is a
//! read-modify-write of that file under a per-story lock, so pipelines for
//! different stories never block each other and two writers for the same
//! story never interleave.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::paths::{StoryPaths, read_json, write_json};
use crate::pipeline::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Done,
    Failed,
}

/// Outcome of one stage for one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub status: ArtifactStatus,
    /// Where the stage output lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<PathBuf>,
    /// Last error, for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Something the stage wants flagged without failing (fallbacks, clamps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Small stage-specific values, e.g. the narration duration.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl ArtifactRecord {
    pub fn pending() -> Self {
        Self {
            status: ArtifactStatus::Pending,
            locator: None,
            error: None,
            note: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ArtifactStatus::Done
    }
}

/// Everything recorded for one story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryArtifacts {
    pub story_id: String,
    /// Fingerprint of the story text the records were produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(default)]
    pub stages: BTreeMap<Stage, ArtifactRecord>,
}

impl StoryArtifacts {
    fn empty(story_id: &str) -> Self {
        Self {
            story_id: story_id.to_string(),
            ..Self::default()
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&ArtifactRecord> {
        self.stages.get(&stage)
    }

    /// Drop the records of every stage after `stage`.
    pub fn clear_downstream(&mut self, stage: Stage) {
        self.stages.retain(|s, _| *s <= stage);
    }
}

/// File-backed artifact store keyed by story id.
pub struct ArtifactStore {
    data_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, story_id: &str) -> Result<PathBuf> {
        Ok(StoryPaths::new(&self.data_dir, story_id)?.artifacts())
    }

    /// Run `f` holding the story's lock. The lock entry is dropped again
    /// once no other caller holds or waits on it.
    fn with_story_lock<T>(&self, story_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(story_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let out = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only made under the map lock, so a count of two (the
        // map and ours) means nobody else is using the entry.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(story_id);
        }
        out
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn read(&self, path: &Path, story_id: &str) -> Result<StoryArtifacts> {
        Ok(read_json(path)?.unwrap_or_else(|| StoryArtifacts::empty(story_id)))
    }

    /// Current records for a story (empty if it never ran).
    pub fn load(&self, story_id: &str) -> Result<StoryArtifacts> {
        let path = self.path(story_id)?;
        self.with_story_lock(story_id, || self.read(&path, story_id))
    }

    pub fn get(&self, story_id: &str, stage: Stage) -> Result<Option<ArtifactRecord>> {
        Ok(self.load(story_id)?.stages.remove(&stage))
    }

    /// Atomic read-modify-write of one story's records.
    pub fn update<T>(
        &self,
        story_id: &str,
        f: impl FnOnce(&mut StoryArtifacts) -> T,
    ) -> Result<T> {
        let path = self.path(story_id)?;
        self.with_story_lock(story_id, || {
            let mut artifacts = self.read(&path, story_id)?;
            let out = f(&mut artifacts);
            write_json(&path, &artifacts)?;
            log::debug!("Updated artifact records for {}", story_id);
            Ok(out)
        })
    }

    /// Record that `stage` started. Its downstream records are dropped
    /// since they were built from the output about to be replaced.
    pub fn begin(&self, story_id: &str, stage: Stage) -> Result<()> {
        self.update(story_id, |a| {
            a.clear_downstream(stage);
            a.stages.insert(stage, ArtifactRecord::pending());
        })
    }

    pub fn finish_done(
        &self,
        story_id: &str,
        stage: Stage,
        locator: PathBuf,
        note: Option<String>,
        data: serde_json::Value,
    ) -> Result<()> {
        self.update(story_id, |a| {
            a.stages.insert(
                stage,
                ArtifactRecord {
                    status: ArtifactStatus::Done,
                    locator: Some(locator),
                    error: None,
                    note,
                    data,
                },
            );
        })
    }

    pub fn finish_failed(&self, story_id: &str, stage: Stage, error: String) -> Result<()> {
        self.update(story_id, |a| {
            let record = a.stages.entry(stage).or_insert_with(ArtifactRecord::pending);
            record.status = ArtifactStatus::Failed;
            record.error = Some(error);
        })
    }

    /// Forget `stage` and everything after it, forcing them to rerun.
    pub fn reset_from(&self, story_id: &str, stage: Stage) -> Result<()> {
        self.update(story_id, |a| a.stages.retain(|s, _| *s < stage))
    }

    /// Tie the records to a story fingerprint. Records made from a
    /// different fingerprint are discarded; returns whether that happened.
    pub fn ensure_source(&self, story_id: &str, source_hash: &str) -> Result<bool> {
        self.update(story_id, |a| {
            let stale = match &a.source_hash {
                Some(h) => h != source_hash,
                None => !a.stages.is_empty(),
            };
            if stale {
                a.stages.clear();
            }
            a.source_hash = Some(source_hash.to_string());
            stale
        })
    }
}
