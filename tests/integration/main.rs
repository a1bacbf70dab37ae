//! Brigade integration test harness.
//!
//! Every test builds a full topology — several workers, sometimes a
//! system manager — on one in-process bus and drives the real protocol
//! end to end: announcements, peer-list convergence, token rotation,
//! job relay with retries, and error routing.
//!
//! Tests use short retry intervals so failure paths resolve in well
//! under a second.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brigade_bus::{Bus, MemoryBus};
use brigade_core::{BrigadeConfig, ErrorNotice, JobEnvelope, RouteTarget};
use brigade_worker::{JobContext, JobHandler, WorkerHandle, WorkerSnapshot};

mod managing;
mod relay;

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn test_config() -> BrigadeConfig {
    let mut config = BrigadeConfig::default();
    config.relay.retry_interval_ms = 100;
    config.relay.max_tries = 3;
    config.relay.shutdown_grace_ms = 10;
    config
}

pub fn new_bus() -> Arc<dyn Bus> {
    Arc::new(MemoryBus::new())
}

/// Handler that records every accepted job and failure notice. Built
/// with `relaying()` it also pushes non-terminal jobs to the next hop.
pub struct Recorder {
    jobs: Mutex<Vec<JobEnvelope>>,
    failures: Mutex<Vec<ErrorNotice>>,
    relaying: bool,
}

impl Recorder {
    pub fn sink() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            relaying: false,
        })
    }

    pub fn relaying() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            relaying: true,
        })
    }

    pub fn jobs(&self) -> Vec<JobEnvelope> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn failures(&self) -> Vec<ErrorNotice> {
        self.failures.lock().unwrap().clone()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }
}

impl JobHandler for Recorder {
    fn process_job(&self, job: &JobEnvelope, ctx: &JobContext) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.relaying {
            let terminal = job
                .current_target()
                .map(|entry| RouteTarget::parse(entry).matches(ctx.descriptor()))
                .unwrap_or(true);
            if !terminal {
                ctx.forward(job, job.data.clone());
            }
        }
        Ok(())
    }

    fn handle_failure(&self, notice: &ErrorNotice) {
        self.failures.lock().unwrap().push(notice.clone());
    }
}

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_STEP: Duration = Duration::from_millis(10);

/// Poll `predicate` until it holds; panic after the timeout.
pub async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
}

/// Current snapshot, panicking if the worker's loop has exited.
pub async fn snapshot(worker: &WorkerHandle) -> WorkerSnapshot {
    worker
        .snapshot()
        .await
        .unwrap_or_else(|| panic!("worker {} is gone", worker.id()))
}

/// Wait until the worker's peer list has exactly `count` entries.
pub async fn wait_for_peers(worker: &WorkerHandle, count: usize) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if snapshot(worker).await.peers.len() == count {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {} to see {count} peers", worker.id());
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
}

/// Wait until the worker has `count` unacknowledged jobs outstanding.
pub async fn wait_for_in_flight(worker: &WorkerHandle, count: usize) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if snapshot(worker).await.in_flight == count {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for {} to have {count} jobs in flight",
                worker.id()
            );
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
}

/// Index of the worker currently holding the rotation token. Panics
/// unless exactly one of them does.
pub async fn token_holder(workers: &[&WorkerHandle]) -> usize {
    let mut holder = None;
    for (i, worker) in workers.iter().enumerate() {
        if snapshot(worker).await.next_job_for_me {
            assert!(holder.is_none(), "two workers hold the rotation token");
            holder = Some(i);
        }
    }
    holder.expect("no worker holds the rotation token")
}
