//! Persisted set of acquired background clips and which ones were used.
//!
//! Each clip is used at most once across all stories. The index is shared
//! by every pipeline in a batch, so all reads and writes go through one
//! mutex and every change is written to disk before the lock is released.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::paths::{background_index, read_json, write_json};

/// A background clip available on local disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSource {
    /// Content id, e.g. the upstream video id.
    pub id: String,
    pub locator: PathBuf,
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryIndex {
    #[serde(default)]
    sources: Vec<BackgroundSource>,
    #[serde(default)]
    used: BTreeSet<String>,
}

impl LibraryIndex {
    fn unused(&self) -> Vec<&BackgroundSource> {
        self.sources
            .iter()
            .filter(|s| !self.used.contains(&s.id))
            .collect()
    }
}

pub struct BackgroundLibrary {
    path: PathBuf,
    index: Mutex<LibraryIndex>,
}

impl BackgroundLibrary {
    /// Open the library stored under `data_dir`, starting empty if no index
    /// exists yet.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = background_index(data_dir);
        let index: LibraryIndex = read_json(&path)?.unwrap_or_default();
        log::debug!(
            "Loaded background index: {} sources, {} used",
            index.sources.len(),
            index.used.len()
        );
        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LibraryIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, index: &LibraryIndex) -> Result<()> {
        write_json(&self.path, index)
    }

    pub fn sources(&self) -> Vec<BackgroundSource> {
        self.lock().sources.clone()
    }

    pub fn unused_count(&self) -> usize {
        self.lock().unused().len()
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.lock().used.contains(id)
    }

    /// Pick a random source that has not been used yet, without claiming it.
    pub fn select_unused<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<BackgroundSource> {
        self.lock().unused().choose(rng).map(|s| (*s).clone())
    }

    /// Pick a random unused source and mark it used in one step, so two
    /// concurrent stories never receive the same clip.
    pub fn take_unused<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Option<BackgroundSource>> {
        let mut index = self.lock();
        let picked = match index.unused().choose(rng) {
            Some(s) => (*s).clone(),
            None => return Ok(None),
        };
        index.used.insert(picked.id.clone());
        self.save(&index)?;
        Ok(Some(picked))
    }

    pub fn mark_used(&self, id: &str) -> Result<()> {
        let mut index = self.lock();
        if index.used.insert(id.to_string()) {
            self.save(&index)?;
        }
        Ok(())
    }

    /// Add a newly acquired source, replacing any entry with the same id.
    pub fn register(&self, source: BackgroundSource) -> Result<()> {
        let mut index = self.lock();
        match index.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source,
            None => index.sources.push(source),
        }
        self.save(&index)
    }
}
