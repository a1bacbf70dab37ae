//! Global worker directory — who is online, by id.

use dashmap::DashMap;

use brigade_core::{JobEnvelope, RouteTarget, WorkerDescriptor};

/// Concurrent map of every worker the manager has seen announce and not
/// seen depart. Shared between the manager's event loop and callers
/// inspecting it.
#[derive(Debug, Default)]
pub struct WorkerDirectory {
    workers: DashMap<String, WorkerDescriptor>,
}

impl WorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Re-announcements simply overwrite.
    pub fn add(&self, worker: WorkerDescriptor) {
        self.workers.insert(worker.id.clone(), worker);
    }

    /// Drop a departed worker. Unknown ids are fine — the directory may
    /// have restarted after the worker announced.
    pub fn remove(&self, id: &str) -> bool {
        self.workers.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Can the job's current hop be serviced by anyone we know of?
    ///
    /// Wildcard hops need any worker of the kind; direct hops need that
    /// exact process. An exhausted or empty route has nothing left to
    /// service and answers true.
    pub fn can_service(&self, job: &JobEnvelope) -> bool {
        let Some(entry) = job.current_target() else {
            return true;
        };
        let target = RouteTarget::parse(entry);
        self.workers.iter().any(|w| target.matches(w.value()))
    }

    /// Stable snapshot for status output and tests.
    pub fn snapshot(&self) -> Vec<WorkerDescriptor> {
        let mut workers: Vec<WorkerDescriptor> =
            self.workers.iter().map(|w| w.value().clone()).collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }
}
