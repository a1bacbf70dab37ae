//! Same-kind peer list with the round-robin rotation token.
//!
//! Each worker owns exactly one `PeerSet` — its private, converging view
//! of every live worker of its kind, itself included. List order is
//! insertion order; the earliest surviving entry (index 0) is the list
//! leader and broadcasts the authoritative copy on membership changes.
//!
//! Invariant: at most one entry has `is_next = true`, and outside of
//! bootstrap exactly one does.

use brigade_core::{PeerEntry, WorkerDescriptor};

#[derive(Debug)]
pub struct PeerSet {
    me: WorkerDescriptor,
    entries: Vec<PeerEntry>,
    /// Local eligibility: does the token entry name this worker?
    next_job_for_me: bool,
}

impl PeerSet {
    /// A fresh worker starts as a singleton holding its own token.
    pub fn new(me: WorkerDescriptor) -> Self {
        let entries = vec![PeerEntry {
            worker: me.clone(),
            is_next: true,
        }];
        Self {
            me,
            entries,
            next_job_for_me: true,
        }
    }

    pub fn next_job_for_me(&self) -> bool {
        self.next_job_for_me
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is this worker the list leader (earliest surviving member)?
    pub fn is_leader(&self) -> bool {
        self.entries
            .first()
            .is_some_and(|e| e.worker.id == self.me.id)
    }

    /// Append a newly announced peer. Duplicate ids are ignored — the
    /// manager keepalive makes every worker re-announce periodically,
    /// and appending blindly would grow the list without bound.
    ///
    /// Returns true if the peer was actually new.
    pub fn insert(&mut self, worker: WorkerDescriptor) -> bool {
        if self.entries.iter().any(|e| e.worker.id == worker.id) {
            return false;
        }
        self.entries.push(PeerEntry {
            worker,
            is_next: false,
        });
        // Appending never moves the token, but bootstrap states may not
        // have one yet.
        if !self.entries.iter().any(|e| e.is_next) {
            self.rotate(Some(0));
        } else {
            self.refresh_eligibility();
        }
        true
    }

    /// Drop a departed peer by id. If it held the token, the token passes
    /// to the entry now occupying its slot (wrapping past the end), so
    /// removal never strands the rotation.
    ///
    /// Returns true if an entry was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.worker.id == id) else {
            return false;
        };
        let held_token = self.entries[index].is_next;
        self.entries.remove(index);

        if self.entries.is_empty() {
            self.next_job_for_me = false;
            return true;
        }
        if held_token {
            self.rotate(Some(index % self.entries.len()));
        } else {
            self.refresh_eligibility();
        }
        true
    }

    /// Is this id in the list?
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.worker.id == id)
    }

    /// Should a broadcast list replace the current view?
    ///
    /// Only when its head is not younger than the current head. The
    /// earliest surviving member owns the authoritative list; a
    /// not-yet-converged worker may believe it leads and broadcast a
    /// bootstrap list that omits the true leader, and adopting that
    /// list would drop the leader from every view with no corrective
    /// broadcast to follow. Age comes from the timestamp in the id.
    pub fn should_adopt(&self, list: &[PeerEntry]) -> bool {
        let (Some(current), Some(candidate)) = (self.entries.first(), list.first()) else {
            return true;
        };
        candidate.worker.minted_at() <= current.worker.minted_at()
    }

    /// Replace the whole list with the leader's broadcast copy.
    /// The caller guards against cross-kind and stale lists.
    pub fn replace(&mut self, entries: Vec<PeerEntry>) {
        self.entries = entries;
        // A malformed broadcast with several tokens keeps only the first.
        let mut seen = false;
        for entry in &mut self.entries {
            if entry.is_next {
                if seen {
                    entry.is_next = false;
                } else {
                    seen = true;
                }
            }
        }
        self.refresh_eligibility();
    }

    /// Move the rotation token.
    ///
    /// `hint` pins the token to an explicit index (used after removal);
    /// without a hint the token advances one slot, wrapping at the end.
    /// A singleton list always keeps its own token.
    pub fn rotate(&mut self, hint: Option<usize>) {
        if self.entries.is_empty() {
            self.next_job_for_me = false;
            return;
        }

        let target = match hint {
            Some(position) => position.min(self.entries.len() - 1),
            None => {
                let current = self.entries.iter().position(|e| e.is_next);
                match current {
                    Some(index) => (index + 1) % self.entries.len(),
                    // No token yet — bootstrap lands it on the head.
                    None => 0,
                }
            }
        };

        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.is_next = index == target;
        }
        self.next_job_for_me = self.entries[target].worker.id == self.me.id;
    }

    fn refresh_eligibility(&mut self) {
        self.next_job_for_me = self
            .entries
            .iter()
            .any(|e| e.is_next && e.worker.id == self.me.id);
    }

    #[cfg(test)]
    fn token_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_next).count()
    }

    #[cfg(test)]
    fn token_holder(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.is_next)
            .map(|e| e.worker.id.as_str())
    }
}
