//! Bounded waits on blocking collaborator calls.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::pipeline::stage::Stage;

/// Run `call` on a worker thread and wait at most `limit` for it.
///
/// A call that overruns is reported as an error and abandoned: its thread
/// keeps running until the call returns, but its result is discarded.
/// Collaborators that spawn programs get the same deadline in their
/// request and kill the program themselves (see [`crate::process`]).
/// A panicking call is reported as an error too.
pub fn run_with_timeout<T, F>(stage: Stage, limit: Duration, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(format!("reelsmith-{stage}"))
        .spawn(move || {
            // The receiver is gone if we already timed out.
            let _ = tx.send(call());
        })
        .context("Failed to spawn worker thread")?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            bail!("{} timed out after {:.1}s", stage, limit.as_secs_f64())
        }
        Err(RecvTimeoutError::Disconnected) => {
            bail!("{} worker stopped without a result", stage)
        }
    }
}
