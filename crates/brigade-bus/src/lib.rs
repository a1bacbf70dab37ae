//! brigade-bus — the topic pub/sub boundary.
//!
//! The coordination protocol only ever sees this trait. Delivery is
//! at-most-once, unordered across topics, and loops back: a publisher
//! with a matching subscription receives its own messages, exactly as a
//! topic exchange delivers to every bound queue. A broker-backed
//! implementation plugs in here without touching the protocol crates.

use bytes::Bytes;
use tokio::sync::mpsc;

pub mod memory;
pub mod pattern;

pub use memory::MemoryBus;
pub use pattern::topic_matches;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection lost: {0}")]
    Disconnected(String),
    #[error("publish on {channel}/{topic} failed: {reason}")]
    PublishFailed {
        channel: String,
        topic: String,
        reason: String,
    },
}

/// One message handed to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The concrete topic the message was published under (the
    /// subscription pattern may be wider).
    pub topic: String,
    pub payload: Bytes,
}

/// A live topic subscription. Dropping it unbinds the queue.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Next delivery, or `None` once the bus side is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Non-blocking poll. `None` when nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Topic-based publish/subscribe.
#[async_trait::async_trait]
pub trait Bus: Send + Sync {
    /// Publish fire-and-forget. No delivery confirmation; the protocol
    /// layers their own acks on top.
    async fn publish(&self, channel: &str, topic: &str, payload: Bytes) -> Result<(), BusError>;

    /// Bind a queue to every topic on `channel` matching `pattern`
    /// (AMQP topic grammar: `*` one segment, `#` zero or more).
    async fn subscribe(&self, channel: &str, pattern: &str) -> Result<Subscription, BusError>;
}
