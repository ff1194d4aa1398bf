//! Waiting on external programs with a deadline.
//!
//! A stage timeout only abandons the worker thread, so adapters that spawn
//! a child process wait on it here and kill it once the deadline passes.

use std::io::Read;
use std::process::{Child, ExitStatus};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit status and captured stderr of a finished program.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    pub stderr: String,
}

/// Wait for `child` to exit, killing it if `deadline` passes first.
///
/// If the child was spawned with a piped stderr, it is drained on a
/// helper thread so a chatty program cannot block on a full pipe.
pub fn wait_until(mut child: Child, deadline: Option<Instant>, name: &str) -> Result<Finished> {
    let stderr = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });

    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("Failed to wait for {name}"))?
        {
            return Ok(Finished {
                status,
                stderr: collect(stderr),
            });
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                log::warn!("Killing {} (pid {}) after its deadline", name, child.id());
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold stderr open; don't join.
                bail!("{name} killed after exceeding its time limit");
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}
