//! In-flight job tracking with cancellable retry timers.
//!
//! A sent job stays in the table until its ack arrives or its tries run
//! out. The table is owned by the worker's event loop — no locking.

use std::collections::HashMap;
use std::time::Duration;

use brigade_core::JobEnvelope;

/// A cancellable one-shot timer backing the retry of one send attempt.
///
/// The timer is a spawned task; cancelling aborts it. Cancelling a timer
/// that already fired (or was already cancelled) is a no-op.
#[derive(Debug)]
pub struct RetryTimer {
    handle: tokio::task::JoinHandle<()>,
}

impl RetryTimer {
    /// Arm a timer that runs `on_expire` after `interval`.
    pub fn spawn(interval: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            on_expire();
        });
        Self { handle }
    }

    /// Idempotent cancel.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One job awaiting acknowledgment.
#[derive(Debug)]
pub struct InFlightJob {
    pub envelope: JobEnvelope,
    /// Send attempts so far, starting at 1.
    pub tries: u32,
    pub timer: RetryTimer,
}

/// All jobs this worker has sent and not yet seen acked.
/// Keyed by job id; ids are unique within one sender.
#[derive(Debug, Default)]
pub struct InFlightTable {
    jobs: HashMap<String, InFlightJob>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a first attempt, or update a retried one in place.
    /// The previous attempt's timer (if any) is cancelled.
    pub fn upsert(&mut self, envelope: JobEnvelope, tries: u32, timer: RetryTimer) {
        let id = envelope.id.clone();
        if let Some(previous) = self.jobs.insert(
            id,
            InFlightJob {
                envelope,
                tries,
                timer,
            },
        ) {
            previous.timer.cancel();
        }
    }

    /// Settle a job: cancel its timer and drop the entry.
    /// `None` if the id is unknown (duplicate ack, stale error).
    pub fn settle(&mut self, job_id: &str) -> Option<InFlightJob> {
        let entry = self.jobs.remove(job_id)?;
        entry.timer.cancel();
        Some(entry)
    }

    pub fn get(&self, job_id: &str) -> Option<&InFlightJob> {
        self.jobs.get(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Cancel every timer and clear the table. Shutdown path.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.jobs.drain() {
            entry.timer.cancel();
        }
    }
}
