//! Run many independent stories on a bounded number of worker threads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::PipelineError;
use crate::pipeline::orchestrator::{Pipeline, RunOptions};
use crate::story::Story;

/// Result of one story in a batch.
#[derive(Debug)]
pub struct StoryOutcome {
    pub story_id: String,
    pub result: Result<PathBuf, PipelineError>,
}

impl StoryOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl Pipeline {
    /// Run `stories` with at most `workers` at a time. Outcomes come back in
    /// input order; one story failing does not stop the others.
    pub fn run_batch(&self, stories: &[Story], workers: usize) -> Vec<StoryOutcome> {
        self.run_batch_with(stories, workers, &RunOptions::default())
    }

    pub fn run_batch_with(
        &self,
        stories: &[Story],
        workers: usize,
        options: &RunOptions,
    ) -> Vec<StoryOutcome> {
        if stories.is_empty() {
            return Vec::new();
        }
        let workers = workers.clamp(1, stories.len());
        log::info!("Processing {} stories with {} workers", stories.len(), workers);

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<StoryOutcome>>> =
            Mutex::new(stories.iter().map(|_| None).collect());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(story) = stories.get(i) else { break };
                    log::info!("Processing story {}/{}: {}", i + 1, stories.len(), story.id);
                    let outcome = StoryOutcome {
                        story_id: story.id.clone(),
                        result: self.run_with(story, options),
                    };
                    slots.lock().unwrap_or_else(PoisonError::into_inner)[i] = Some(outcome);
                });
            }
        });

        let outcomes: Vec<StoryOutcome> = slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect();
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            log::warn!("{} of {} stories failed", failed, outcomes.len());
        }
        outcomes
    }
}
