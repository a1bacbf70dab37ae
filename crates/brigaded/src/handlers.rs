//! Demo job handlers for the daemon.

use anyhow::Result;
use brigade_core::{ErrorNotice, JobEnvelope, RouteTarget};
use brigade_worker::{JobContext, JobHandler};

/// Logs every job it accepts and relays it toward the next hop. At the
/// route's end (the current entry names this worker) it terminates the
/// pipeline instead.
pub struct RelayHandler {
    label: String,
}

impl RelayHandler {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

impl JobHandler for RelayHandler {
    fn process_job(&self, job: &JobEnvelope, ctx: &JobContext) -> Result<()> {
        let terminal = job
            .current_target()
            .map(|entry| RouteTarget::parse(entry).matches(ctx.descriptor()))
            .unwrap_or(true);

        if terminal {
            tracing::info!(
                handler = %self.label,
                job = %job.id,
                data = %job.data,
                "pipeline complete"
            );
        } else {
            tracing::info!(
                handler = %self.label,
                job = %job.id,
                cursor = job.workers_list_id,
                "relaying job to next hop"
            );
            ctx.forward(job, job.data.clone());
        }
        Ok(())
    }

    fn handle_failure(&self, notice: &ErrorNotice) {
        tracing::error!(
            handler = %self.label,
            job = %notice.id,
            error = %notice.error,
            "job failed"
        );
    }
}
