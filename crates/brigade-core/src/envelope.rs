//! Payload types carried on the bus.
//!
//! `JobEnvelope` rides `worker.next` and, cursor-advanced, `worker.next.ack`.
//! `ErrorNotice` rides the `error` topic. The peer-list broadcast on
//! `worker.list` is a plain `Vec<PeerEntry>`.

use serde::{Deserialize, Serialize};

use crate::descriptor::{unique_millis, WorkerDescriptor};

/// A job traveling along a route of worker kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// `"J<millis>"`. Stable across retries of the same hop and across
    /// forwarding — one logical job keeps one id for its whole route.
    pub id: String,
    /// The fixed ordered route. Entries use the `RouteTarget` grammar.
    pub workers_list: Vec<String>,
    /// Current hop cursor. Never decreases, never exceeds the last index.
    /// Advanced by the accepting worker immediately before the ack.
    pub workers_list_id: usize,
    /// Opaque job payload.
    pub data: serde_json::Value,
    /// Who published this envelope (and owns its retry timer).
    pub sender: WorkerDescriptor,
    /// Set on the ack of a direct-addressed delivery: observers must not
    /// advance their rotation token for it.
    #[serde(default)]
    pub direct: bool,
    /// Set on the ack: the worker that accepted the hop. Same-kind peers
    /// advance their rotation copies when they observe it.
    #[serde(default)]
    pub handled_by: Option<WorkerDescriptor>,
}

impl JobEnvelope {
    /// Build a fresh envelope at the start of a route (or at a forwarded
    /// hop, when `cursor` and `job_id` carry over).
    pub fn new(
        workers_list: Vec<String>,
        data: serde_json::Value,
        sender: WorkerDescriptor,
        cursor: usize,
        job_id: Option<String>,
    ) -> Self {
        Self {
            id: job_id.unwrap_or_else(|| format!("J{}", unique_millis())),
            workers_list,
            workers_list_id: cursor,
            data,
            sender,
            direct: false,
            handled_by: None,
        }
    }

    /// The route entry at the current cursor, if the route is non-empty.
    pub fn current_target(&self) -> Option<&str> {
        self.workers_list.get(self.workers_list_id).map(String::as_str)
    }

    /// Is the cursor at the final hop?
    pub fn at_last_hop(&self) -> bool {
        self.workers_list_id + 1 >= self.workers_list.len()
    }
}

/// Failure notification, broadcast on `error` and filtered by `target`.
/// Ephemeral — consumed once by the matching worker, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// Id of the worker that originated the failed job.
    pub target: String,
    /// The failed job's id.
    pub id: String,
    /// Human-readable reason.
    pub error: String,
    /// The original job payload, so the originator can answer upstream.
    pub data: serde_json::Value,
}

/// One slot of a same-kind peer list.
///
/// At most one entry of a list has `is_next = true` — that peer holds the
/// rotation token and accepts the next wildcard-routed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub worker: WorkerDescriptor,
    pub is_next: bool,
}
