//! System manager runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use brigade_bus::{Bus, BusError, Subscription};
use brigade_core::topic::{
    CHANNEL_NOTIFICATIONS, CHANNEL_POLLING, TOPIC_ERROR, TOPIC_POLL_WORKER_LIST, TOPIC_WORKER_DEL,
    TOPIC_WORKER_GET_ALL, TOPIC_WORKER_NEW_PATTERN, TOPIC_WORKER_NEXT,
};
use brigade_core::{BrigadeConfig, ErrorNotice, JobEnvelope, WireCodec, WorkerDescriptor};

use crate::directory::WorkerDirectory;

/// Reason published when no known worker can take a job's current hop.
const ERR_NO_WORKER: &str = "no worker available for this job";

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("bus subscription failed: {0}")]
    Subscribe(#[from] BusError),
}

/// The system manager: directory bookkeeping plus the job-feasibility
/// answering machine. Everything it knows arrives over the bus.
pub struct SystemManager {
    directory: Arc<WorkerDirectory>,
    bus: Arc<dyn Bus>,
    codec: WireCodec,
}

/// One delivery, tagged with the channel it arrived on — the manager is
/// the only component listening on two channels.
struct ManagerEvent {
    channel: &'static str,
    topic: String,
    payload: bytes::Bytes,
}

impl SystemManager {
    /// Start the manager: bind subscriptions, kick one keepalive round,
    /// and spawn the event loop plus the keepalive interval task.
    pub async fn spawn(
        bus: Arc<dyn Bus>,
        config: &BrigadeConfig,
    ) -> Result<ManagerHandle, ManagerError> {
        let codec = config.broker.codec;
        let directory = Arc::new(WorkerDirectory::new());
        tracing::info!("system manager starting");

        let (tx, mut rx) = mpsc::channel::<ManagerEvent>(256);
        for (channel, pattern) in [
            (CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEW_PATTERN),
            (CHANNEL_NOTIFICATIONS, TOPIC_WORKER_DEL),
            (CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT),
            (CHANNEL_POLLING, TOPIC_POLL_WORKER_LIST),
        ] {
            let sub = bus.subscribe(channel, pattern).await?;
            forward_deliveries(sub, channel, tx.clone());
        }

        // Ask everyone already online to introduce themselves.
        publish_keepalive(bus.as_ref()).await;

        let keepalive = if config.manager.keepalive_ms > 0 {
            let bus = bus.clone();
            let interval = Duration::from_millis(config.manager.keepalive_ms);
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // immediate first tick already covered
                loop {
                    ticker.tick().await;
                    publish_keepalive(bus.as_ref()).await;
                }
            }))
        } else {
            None
        };

        let manager = SystemManager {
            directory: directory.clone(),
            bus,
            codec,
        };
        let join = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                manager.on_event(event).await;
            }
        });

        Ok(ManagerHandle {
            directory,
            join,
            keepalive,
        })
    }

    async fn on_event(&self, event: ManagerEvent) {
        match (event.channel, event.topic.as_str()) {
            (CHANNEL_POLLING, TOPIC_POLL_WORKER_LIST) => self.print_worker_list(),
            (CHANNEL_NOTIFICATIONS, TOPIC_WORKER_DEL) => {
                if let Some(worker) = self.decode::<WorkerDescriptor>(&event) {
                    if self.directory.remove(&worker.id) {
                        tracing::info!(
                            worker = %worker.id,
                            online = self.directory.len(),
                            "worker removed from directory"
                        );
                    }
                }
            }
            (CHANNEL_NOTIFICATIONS, TOPIC_WORKER_NEXT) => {
                if let Some(job) = self.decode::<JobEnvelope>(&event) {
                    self.on_next_job(job).await;
                }
            }
            // Everything else on notifications matched `worker.new.*`.
            (CHANNEL_NOTIFICATIONS, _) => {
                if let Some(worker) = self.decode::<WorkerDescriptor>(&event) {
                    tracing::info!(
                        worker = %worker.id,
                        kind = %worker.kind,
                        "worker added to directory"
                    );
                    self.directory.add(worker);
                }
            }
            _ => {}
        }
    }

    /// A job is on offer; if nobody we know can take its current hop,
    /// tell the sender now rather than letting it retry into silence.
    async fn on_next_job(&self, job: JobEnvelope) {
        if self.directory.can_service(&job) {
            tracing::debug!(job = %job.id, "job can be serviced");
            return;
        }
        tracing::warn!(
            job = %job.id,
            hop = job.current_target().unwrap_or("<none>"),
            "no worker for job, notifying sender"
        );
        let notice = ErrorNotice {
            target: job.sender.id,
            id: job.id,
            error: ERR_NO_WORKER.to_string(),
            data: job.data,
        };
        match self.codec.encode(&notice) {
            Ok(payload) => {
                if let Err(error) = self
                    .bus
                    .publish(CHANNEL_NOTIFICATIONS, TOPIC_ERROR, payload)
                    .await
                {
                    tracing::warn!(%error, "failed to publish error notice");
                }
            }
            Err(error) => tracing::error!(%error, "failed to encode error notice"),
        }
    }

    /// Operator-triggered directory dump (polling channel).
    fn print_worker_list(&self) {
        let workers = self.directory.snapshot();
        tracing::info!(online = workers.len(), "worker list requested");
        for worker in &workers {
            tracing::info!(worker = %worker.id, kind = %worker.kind, "online");
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, event: &ManagerEvent) -> Option<T> {
        match self.codec.decode(&event.payload) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(topic = %event.topic, %error, "ignoring undecodable payload");
                None
            }
        }
    }
}

async fn publish_keepalive(bus: &dyn Bus) {
    let payload = bytes::Bytes::from_static(b"\"who's online?\"");
    if let Err(error) = bus
        .publish(CHANNEL_NOTIFICATIONS, TOPIC_WORKER_GET_ALL, payload)
        .await
    {
        tracing::warn!(%error, "keepalive publish failed");
    }
}

fn forward_deliveries(
    mut sub: Subscription,
    channel: &'static str,
    tx: mpsc::Sender<ManagerEvent>,
) {
    tokio::spawn(async move {
        while let Some(delivery) = sub.recv().await {
            let event = ManagerEvent {
                channel,
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

/// Caller-side handle to a running manager.
pub struct ManagerHandle {
    directory: Arc<WorkerDirectory>,
    join: tokio::task::JoinHandle<()>,
    keepalive: Option<tokio::task::JoinHandle<()>>,
}

impl ManagerHandle {
    /// Live view of the directory.
    pub fn directory(&self) -> &WorkerDirectory {
        &self.directory
    }

    /// Stop the event loop and the keepalive ticker.
    pub fn shutdown(self) {
        tracing::info!("system manager stopping");
        self.join.abort();
        if let Some(keepalive) = self.keepalive {
            keepalive.abort();
        }
    }
}
