//! Worker runtime — one event loop per worker process.
//!
//! All bus deliveries, retry-timer firings, and caller commands funnel
//! into a single task, so peer-list and in-flight mutation never needs a
//! lock. Bootstrap order is fixed: subscribe everything first, announce
//! second — a worker must not miss the reply to its own announcement.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use brigade_bus::{Bus, BusError, Subscription};
use brigade_core::config::RelayConfig;
use brigade_core::topic::{
    CHANNEL_NOTIFICATIONS, TOPIC_ERROR, TOPIC_WORKER_DEL, TOPIC_WORKER_GET_ALL, TOPIC_WORKER_LIST,
    TOPIC_WORKER_NEW, TOPIC_WORKER_NEXT, TOPIC_WORKER_NEXT_ACK,
};
use brigade_core::{
    BrigadeConfig, CodecError, ErrorNotice, JobEnvelope, PeerEntry, RouteTarget, WireCodec,
    WorkerDescriptor,
};

use crate::handler::{JobContext, JobHandler};
use crate::peer_set::PeerSet;
use crate::relay::{InFlightTable, RetryTimer};

/// Terminal failure reason for a job whose retries ran out.
const ERR_TOO_MANY_ATTEMPTS: &str = "too many attempts";

/// Bound on the inbound bus queue. Backpressure onto the forwarder
/// tasks, never onto the bus itself.
const BUS_QUEUE_DEPTH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("bus subscription failed: {0}")]
    Subscribe(#[from] BusError),
    #[error("wire encoding failed: {0}")]
    Codec(#[from] CodecError),
}

/// Commands queued onto the worker's event loop.
pub(crate) enum Command {
    SendJob {
        route: Vec<String>,
        data: serde_json::Value,
        cursor: usize,
        job_id: Option<String>,
        tries: u32,
    },
    RetryFired(String),
    Snapshot(oneshot::Sender<WorkerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of a worker's coordination state.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub descriptor: WorkerDescriptor,
    pub peers: Vec<PeerEntry>,
    pub next_job_for_me: bool,
    pub in_flight: usize,
}

struct BusEvent {
    topic: String,
    payload: Bytes,
}

/// The worker runtime. Constructed via [`Worker::spawn`], driven
/// entirely by its own task; callers interact through [`WorkerHandle`].
pub struct Worker {
    descriptor: WorkerDescriptor,
    peers: PeerSet,
    in_flight: InFlightTable,
    handler: Arc<dyn JobHandler>,
    bus: Arc<dyn Bus>,
    codec: WireCodec,
    relay: RelayConfig,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Worker {
    /// Start a worker of `kind`: bind all subscriptions, announce, and
    /// spawn the event loop.
    pub async fn spawn(
        bus: Arc<dyn Bus>,
        config: &BrigadeConfig,
        kind: &str,
        handler: Arc<dyn JobHandler>,
    ) -> Result<WorkerHandle, WorkerError> {
        let descriptor = WorkerDescriptor::new(kind);
        let codec = config.broker.codec;
        tracing::info!(id = %descriptor.id, "worker starting");

        // Subscribe before announcing (bootstrap step 1).
        let (bus_tx, bus_rx) = mpsc::channel(BUS_QUEUE_DEPTH);
        for topic in [
            TOPIC_ERROR,
            TOPIC_WORKER_GET_ALL,
            TOPIC_WORKER_NEXT,
            TOPIC_WORKER_NEXT_ACK,
            TOPIC_WORKER_NEW,
            TOPIC_WORKER_LIST,
            TOPIC_WORKER_DEL,
        ] {
            let sub = bus.subscribe(CHANNEL_NOTIFICATIONS, topic).await?;
            forward_deliveries(sub, bus_tx.clone());
        }

        // Announce (bootstrap step 2).
        let announcement = codec.encode(&descriptor)?;
        bus.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEW, announcement)
            .await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            descriptor: descriptor.clone(),
            peers: PeerSet::new(descriptor.clone()),
            in_flight: InFlightTable::new(),
            handler,
            bus,
            codec,
            relay: config.relay.clone(),
            cmd_tx: cmd_tx.clone(),
        };
        let join = tokio::spawn(worker.run(bus_rx, cmd_rx));

        Ok(WorkerHandle {
            descriptor,
            cmd_tx,
            join,
        })
    }

    async fn run(
        mut self,
        mut bus_rx: mpsc::Receiver<BusEvent>,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            tokio::select! {
                Some(event) = bus_rx.recv() => {
                    self.on_bus_event(event).await;
                }
                Some(command) = cmd_rx.recv() => {
                    if self.on_command(command).await {
                        break;
                    }
                }
                else => break,
            }
        }
    }

    // ── Bus event dispatch ────────────────────────────────────────────────────

    async fn on_bus_event(&mut self, event: BusEvent) {
        match event.topic.as_str() {
            TOPIC_WORKER_NEW => {
                if let Some(peer) = self.decode::<WorkerDescriptor>(&event) {
                    self.on_worker_new(peer).await;
                }
            }
            TOPIC_WORKER_LIST => {
                if let Some(list) = self.decode::<Vec<PeerEntry>>(&event) {
                    self.on_worker_list(list).await;
                }
            }
            TOPIC_WORKER_DEL => {
                if let Some(peer) = self.decode::<WorkerDescriptor>(&event) {
                    self.on_worker_del(peer);
                }
            }
            TOPIC_WORKER_GET_ALL => {
                // Keepalive trigger, payload irrelevant: re-announce so the
                // manager's directory heals after a restart.
                self.announce().await;
            }
            TOPIC_WORKER_NEXT => {
                if let Some(job) = self.decode::<JobEnvelope>(&event) {
                    self.on_next_job(job).await;
                }
            }
            TOPIC_WORKER_NEXT_ACK => {
                if let Some(ack) = self.decode::<JobEnvelope>(&event) {
                    self.on_next_job_ack(ack);
                }
            }
            TOPIC_ERROR => {
                if let Some(notice) = self.decode::<ErrorNotice>(&event) {
                    self.on_error(notice);
                }
            }
            other => {
                tracing::trace!(topic = other, "unhandled topic");
            }
        }
    }

    // ── Peer-set protocol ─────────────────────────────────────────────────────

    async fn on_worker_new(&mut self, peer: WorkerDescriptor) {
        if peer.id == self.descriptor.id || peer.kind != self.descriptor.kind {
            return;
        }
        if !self.peers.insert(peer.clone()) {
            return; // re-announcement of a known peer
        }
        tracing::info!(peer = %peer.id, peers = self.peers.len(), "same-kind peer joined");

        // The earliest surviving member owns the authoritative list and
        // pushes it to everyone, the newcomer included.
        if self.peers.is_leader() {
            let list = self.peers.entries().to_vec();
            self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_LIST, &list)
                .await;
        }
    }

    async fn on_worker_list(&mut self, list: Vec<PeerEntry>) {
        // Cross-kind contamination guard: adopt only lists led by our kind.
        let Some(first) = list.first() else { return };
        if first.worker.kind != self.descriptor.kind {
            return;
        }
        // Age guard: a bootstrap list from a self-appointed younger
        // leader must lose to the current view, or the true leader
        // vanishes from every list with nothing left to correct it.
        if !self.peers.should_adopt(&list) {
            tracing::debug!(head = %first.worker.id, "stale peer list rejected");
            return;
        }
        self.peers.replace(list);
        // A list broadcast before this worker joined omits it. Rejoin:
        // re-add locally and re-announce so the leader rebroadcasts a
        // complete list.
        if !self.peers.contains(&self.descriptor.id) {
            self.peers.insert(self.descriptor.clone());
            self.announce().await;
        }
        tracing::debug!(
            peers = self.peers.len(),
            eligible = self.peers.next_job_for_me(),
            "peer list adopted from leader"
        );
    }

    fn on_worker_del(&mut self, peer: WorkerDescriptor) {
        if peer.kind != self.descriptor.kind || peer.id == self.descriptor.id {
            return;
        }
        if self.peers.remove(&peer.id) {
            tracing::info!(peer = %peer.id, peers = self.peers.len(), "same-kind peer departed");
        }
    }

    async fn announce(&self) {
        self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEW, &self.descriptor)
            .await;
    }

    // ── Job relay protocol ────────────────────────────────────────────────────

    async fn on_next_job(&mut self, job: JobEnvelope) {
        let Some(entry) = job.current_target() else {
            return; // empty route
        };
        let target = RouteTarget::parse(entry);
        let eligible = match &target {
            RouteTarget::Wildcard(kind) => {
                kind == &self.descriptor.kind && self.peers.next_job_for_me()
            }
            RouteTarget::Direct(id) => id == &self.descriptor.id,
        };
        if !eligible {
            return; // someone else's job — expected filtering, not an error
        }

        // Advance the cursor (never past the final hop) and echo the ack
        // before processing, so the sender's retry timer dies even if the
        // handler is slow.
        let mut ack = job;
        if !ack.at_last_hop() {
            ack.workers_list_id += 1;
        }
        ack.direct = target.is_direct();
        ack.handled_by = Some(self.descriptor.clone());

        tracing::info!(
            job = %ack.id,
            cursor = ack.workers_list_id,
            direct = ack.direct,
            "job accepted"
        );
        self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT_ACK, &ack)
            .await;

        let ctx = JobContext::new(self.descriptor.clone(), self.cmd_tx.clone());
        if let Err(error) = self.handler.process_job(&ack, &ctx) {
            tracing::warn!(job = %ack.id, error = %error, "job processing failed");
        }
    }

    fn on_next_job_ack(&mut self, ack: JobEnvelope) {
        // Sender bookkeeping: only the original sender settles the entry.
        // Duplicate acks find nothing and fall through.
        if ack.sender.id == self.descriptor.id && ack.sender.kind == self.descriptor.kind {
            if self.in_flight.settle(&ack.id).is_some() {
                tracing::debug!(job = %ack.id, "ack received, retry timer cancelled");
            }
        }

        // Rotation advance: every peer of the accepting worker's kind —
        // the acceptor itself included, via bus loopback — moves its
        // token copy off the same broadcast. Direct deliveries bypass
        // rotation and must not advance it.
        if ack.direct {
            return;
        }
        if let Some(handled_by) = &ack.handled_by {
            if handled_by.kind == self.descriptor.kind {
                self.peers.rotate(None);
                tracing::debug!(
                    job = %ack.id,
                    eligible = self.peers.next_job_for_me(),
                    "rotation advanced"
                );
            }
        }
    }

    async fn send_job(
        &mut self,
        route: Vec<String>,
        data: serde_json::Value,
        cursor: usize,
        job_id: Option<String>,
        tries: u32,
    ) {
        let envelope = JobEnvelope::new(route, data, self.descriptor.clone(), cursor, job_id);
        tracing::info!(job = %envelope.id, cursor, tries, "sending job to next worker");
        self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT, &envelope)
            .await;
        let timer = self.arm_retry(&envelope.id);
        self.in_flight.upsert(envelope, tries, timer);
    }

    fn arm_retry(&self, job_id: &str) -> RetryTimer {
        let cmd_tx = self.cmd_tx.clone();
        let job_id = job_id.to_string();
        RetryTimer::spawn(self.relay.retry_interval(), move || {
            let _ = cmd_tx.send(Command::RetryFired(job_id));
        })
    }

    async fn on_retry_fired(&mut self, job_id: String) {
        let (exhausted, envelope, tries) = match self.in_flight.get(&job_id) {
            // Settled between fire and dispatch — stale timer, ignore.
            None => return,
            Some(entry) => (
                entry.tries >= self.relay.max_tries,
                entry.envelope.clone(),
                entry.tries,
            ),
        };

        if !exhausted {
            let tries = tries + 1;
            tracing::warn!(job = %job_id, tries, max = self.relay.max_tries, "no ack, resending job");
            self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT, &envelope)
                .await;
            let timer = self.arm_retry(&job_id);
            self.in_flight.upsert(envelope, tries, timer);
            return;
        }

        // Terminal, locally detected failure: never silently dropped,
        // never a crash — handed to the failure hook.
        if let Some(entry) = self.in_flight.settle(&job_id) {
            tracing::error!(job = %job_id, tries, "job abandoned after too many attempts");
            let notice = ErrorNotice {
                target: self.descriptor.id.clone(),
                id: job_id,
                error: ERR_TOO_MANY_ATTEMPTS.to_string(),
                data: entry.envelope.data,
            };
            self.handler.handle_failure(&notice);
        }
    }

    // ── Error routing ─────────────────────────────────────────────────────────

    fn on_error(&mut self, notice: ErrorNotice) {
        if notice.target != self.descriptor.id {
            return; // broadcast topic, someone else's failure
        }
        // Best-effort: the entry may already be settled.
        let was_tracked = self.in_flight.settle(&notice.id).is_some();
        tracing::warn!(
            job = %notice.id,
            error = %notice.error,
            was_tracked,
            "error notice received"
        );
        self.handler.handle_failure(&notice);
    }

    // ── Commands & lifecycle ──────────────────────────────────────────────────

    /// Returns true when the loop should exit.
    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::SendJob {
                route,
                data,
                cursor,
                job_id,
                tries,
            } => {
                self.send_job(route, data, cursor, job_id, tries).await;
                false
            }
            Command::RetryFired(job_id) => {
                self.on_retry_fired(job_id).await;
                false
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(WorkerSnapshot {
                    descriptor: self.descriptor.clone(),
                    peers: self.peers.entries().to_vec(),
                    next_job_for_me: self.peers.next_job_for_me(),
                    in_flight: self.in_flight.len(),
                });
                false
            }
            Command::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
                true
            }
        }
    }

    /// Orderly departure: kill timers, tell the bus, then hold the
    /// process long enough for the notice to actually leave.
    async fn shutdown(&mut self) {
        tracing::info!(id = %self.descriptor.id, "worker stopping");
        self.in_flight.cancel_all();
        self.publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_DEL, &self.descriptor)
            .await;
        tokio::time::sleep(self.relay.shutdown_grace()).await;
    }

    // ── Wire helpers ──────────────────────────────────────────────────────────

    fn decode<T: DeserializeOwned>(&self, event: &BusEvent) -> Option<T> {
        match self.codec.decode(&event.payload) {
            Ok(value) => Some(value),
            Err(error) => {
                // Foreign or malformed payloads are filtered, not failed.
                tracing::debug!(topic = %event.topic, %error, "ignoring undecodable payload");
                None
            }
        }
    }

    async fn publish<T: Serialize>(&self, channel: &str, topic: &str, value: &T) {
        let payload = match self.codec.encode(value) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(topic, %error, "failed to encode payload");
                return;
            }
        };
        if let Err(error) = self.bus.publish(channel, topic, payload).await {
            tracing::warn!(topic, %error, "publish failed");
        }
    }
}

/// Pump one subscription into the worker's event queue. Ends when either
/// side goes away.
fn forward_deliveries(mut sub: Subscription, tx: mpsc::Sender<BusEvent>) {
    tokio::spawn(async move {
        while let Some(delivery) = sub.recv().await {
            let event = BusEvent {
                topic: delivery.topic,
                payload: delivery.payload,
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Caller-side handle to a spawned worker.
pub struct WorkerHandle {
    descriptor: WorkerDescriptor,
    cmd_tx: mpsc::UnboundedSender<Command>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Push a job onto a route. Fire-and-forget: delivery confirmation
    /// arrives asynchronously via the ack machinery, failures via the
    /// handler's failure hook.
    pub fn send_to_next_worker(&self, route: Vec<String>, data: serde_json::Value) {
        let _ = self.cmd_tx.send(Command::SendJob {
            route,
            data,
            cursor: 0,
            job_id: None,
            tries: 1,
        });
    }

    /// Current coordination state, or `None` if the worker is gone.
    pub async fn snapshot(&self) -> Option<WorkerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Orderly shutdown: departure notice, grace delay, loop exit.
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        let _ = self.join.await;
    }
}
