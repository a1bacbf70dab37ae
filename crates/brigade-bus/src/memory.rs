//! In-process topic bus.
//!
//! Backs tests and single-process topologies. Semantics mirror a topic
//! exchange with one exclusive queue per subscription: every matching
//! binding gets a copy, including the publisher's own subscriptions.
//! Queues are unbounded so a slow subscriber never blocks a publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::{pattern::topic_matches, Bus, BusError, Delivery, Subscription};

struct Binding {
    pattern: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Shared in-process bus. Cheap to clone; clones address the same
/// exchange.
#[derive(Clone, Default)]
pub struct MemoryBus {
    channels: Arc<DashMap<String, Vec<Binding>>>,
    published: Arc<AtomicU64>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total messages accepted for publication since creation.
    /// Test observability only — not part of the bus contract.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, topic: &str, payload: Bytes) -> Result<(), BusError> {
        self.published.fetch_add(1, Ordering::Relaxed);

        let Some(mut bindings) = self.channels.get_mut(channel) else {
            // No subscriber ever bound this channel; at-most-once says drop.
            return Ok(());
        };

        bindings.retain(|binding| {
            if !topic_matches(&binding.pattern, topic) {
                return true;
            }
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            // A closed receiver means the subscription was dropped; prune it.
            binding.tx.send(delivery).is_ok()
        });

        Ok(())
    }

    async fn subscribe(&self, channel: &str, pattern: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(Binding {
                pattern: pattern.to_string(),
                tx,
            });
        tracing::trace!(channel, pattern, "subscription bound");
        Ok(Subscription::new(rx))
    }
}
