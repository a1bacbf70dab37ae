//! The extension seam between the coordination core and business logic.
//!
//! The core holds a `dyn JobHandler` — never a concrete leaf type. A
//! handler that needs to push work further down the route does so
//! through [`JobContext`], which queues commands onto the worker's own
//! event loop without blocking.

use anyhow::Result;
use brigade_core::{ErrorNotice, JobEnvelope, WorkerDescriptor};
use tokio::sync::mpsc;

use crate::worker::Command;

/// Business logic for one worker kind.
///
/// `process_job` runs on the worker's event loop after the job has been
/// acknowledged, so slow processing never delays the sender's retry
/// cancellation. An error return is logged; it does not fail the job on
/// the wire (the ack is already out).
pub trait JobHandler: Send + Sync {
    /// Handle an accepted job. The envelope cursor already points past
    /// this hop (or at it, when this hop is the route's end).
    fn process_job(&self, job: &JobEnvelope, ctx: &JobContext) -> Result<()>;

    /// Called when a job this worker originated ultimately failed —
    /// retry exhaustion or a manager infeasibility notice.
    fn handle_failure(&self, _notice: &ErrorNotice) {}
}

/// Handle given to `process_job` for emitting follow-on jobs.
#[derive(Clone)]
pub struct JobContext {
    descriptor: WorkerDescriptor,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl JobContext {
    pub(crate) fn new(
        descriptor: WorkerDescriptor,
        cmd_tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self { descriptor, cmd_tx }
    }

    /// This worker's identity.
    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    /// Start a fresh job on a new route. Non-blocking; the worker's
    /// event loop performs the publish and owns the retry timer.
    pub fn send_to_next_worker(&self, route: Vec<String>, data: serde_json::Value) {
        let _ = self.cmd_tx.send(Command::SendJob {
            route,
            data,
            cursor: 0,
            job_id: None,
            tries: 1,
        });
    }

    /// Relay an accepted job to its next hop, keeping the job id and the
    /// already-advanced cursor. Only meaningful from non-terminal hops.
    pub fn forward(&self, job: &JobEnvelope, data: serde_json::Value) {
        let _ = self.cmd_tx.send(Command::SendJob {
            route: job.workers_list.clone(),
            data,
            cursor: job.workers_list_id,
            job_id: Some(job.id.clone()),
            tries: 1,
        });
    }
}
