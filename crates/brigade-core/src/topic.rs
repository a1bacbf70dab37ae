//! Canonical channel and topic names.
//!
//! These strings ARE the protocol surface — workers and the manager
//! agree on nothing else. Renaming one after deployment is a breaking
//! change.

/// Channel carrying all coordination traffic.
pub const CHANNEL_NOTIFICATIONS: &str = "notifications";

/// Side channel for operator polling requests.
pub const CHANNEL_POLLING: &str = "polling";

/// Worker self-announcement (`WorkerDescriptor`).
pub const TOPIC_WORKER_NEW: &str = "worker.new.send";

/// Pattern matching every announcement variant. The manager binds this.
pub const TOPIC_WORKER_NEW_PATTERN: &str = "worker.new.*";

/// Leader's full peer-list broadcast (`Vec<PeerEntry>`).
pub const TOPIC_WORKER_LIST: &str = "worker.list";

/// Worker departure notice (`WorkerDescriptor`).
pub const TOPIC_WORKER_DEL: &str = "worker.del";

/// Manager keepalive trigger — every worker re-announces on receipt.
pub const TOPIC_WORKER_GET_ALL: &str = "worker.getAll";

/// Job offer to the eligible hop (`JobEnvelope`).
pub const TOPIC_WORKER_NEXT: &str = "worker.next";

/// Acceptance echo, cursor-advanced (`JobEnvelope`).
pub const TOPIC_WORKER_NEXT_ACK: &str = "worker.next.ack";

/// Failure notices (`ErrorNotice`), filtered by target id.
pub const TOPIC_ERROR: &str = "error";

/// On the polling channel: ask the manager to dump its directory.
pub const TOPIC_POLL_WORKER_LIST: &str = "worker.list";
