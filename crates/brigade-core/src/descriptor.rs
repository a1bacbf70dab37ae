//! Worker identity and route addressing.
//!
//! A worker id is `"<kind>:<millis>"` — the kind string plus the creation
//! timestamp. Ids are only ever compared for equality, never ordered, so
//! clock skew between processes is harmless. Within one process a
//! monotonic guard keeps two ids minted in the same millisecond distinct.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identity of one worker process: unique id plus the kind it serves.
///
/// Immutable once created. One instance per process, echoed in every
/// message that process sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// `"<kind>:<millis>"`, unique for the process lifetime.
    pub id: String,
    /// Worker kind, e.g. `"WA"`. Routes address kinds, not processes.
    pub kind: String,
}

impl WorkerDescriptor {
    /// Mint a descriptor for a new worker process of the given kind.
    pub fn new(kind: &str) -> Self {
        Self {
            id: format!("{}:{}", kind, unique_millis()),
            kind: kind.to_string(),
        }
    }

    /// The creation timestamp embedded in the id. Orders members by
    /// age; an id without one sorts as newest.
    pub fn minted_at(&self) -> u64 {
        self.id
            .rsplit_once(':')
            .and_then(|(_, millis)| millis.parse().ok())
            .unwrap_or(u64::MAX)
    }
}

impl fmt::Display for WorkerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One entry of a job route.
///
/// Grammar: `"<kind>:*"` is a rotation-eligible wildcard, a full worker
/// id (`"<kind>:<millis>"`) addresses one process directly, and a bare
/// kind with no colon is tolerated as a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Any worker of this kind; the rotation token picks which one.
    Wildcard(String),
    /// Exactly one worker, by full id. Bypasses rotation.
    Direct(String),
}

impl RouteTarget {
    /// Parse a route entry string.
    pub fn parse(entry: &str) -> Self {
        match entry.rsplit_once(':') {
            Some((kind, "*")) => RouteTarget::Wildcard(kind.to_string()),
            Some(_) => RouteTarget::Direct(entry.to_string()),
            None => RouteTarget::Wildcard(entry.to_string()),
        }
    }

    /// Does this entry make `worker` an acceptance candidate?
    ///
    /// Wildcard entries match by kind (the rotation token still has to
    /// agree); direct entries match by exact id.
    pub fn matches(&self, worker: &WorkerDescriptor) -> bool {
        match self {
            RouteTarget::Wildcard(kind) => kind == &worker.kind,
            RouteTarget::Direct(id) => id == &worker.id,
        }
    }

    /// True for direct (one-process) addressing.
    pub fn is_direct(&self) -> bool {
        matches!(self, RouteTarget::Direct(_))
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Wildcard(kind) => write!(f, "{kind}:*"),
            RouteTarget::Direct(id) => f.write_str(id),
        }
    }
}

/// Milliseconds since the epoch, strictly increasing within this process.
///
/// Two descriptors or job ids created in the same millisecond would
/// otherwise collide; the id shape stays a plain timestamp.
pub fn unique_millis() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => prev = observed,
        }
    }
}
