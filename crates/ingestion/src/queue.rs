//! Bounded inbound queue with drop policy
//!
//! Producers (UDP receive loop, host callbacks) never await capacity: a full
//! queue either evicts its oldest message or rejects the new one.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{DropPolicy, Message};
use tracing::{trace, warn};

use crate::config::{BackpressureConfig, IngestionMetrics};

/// Eviction retries before falling back to dropping the incoming message
const MAX_EVICT_ATTEMPTS: usize = 4;

/// Producer side of the inbound queue
///
/// Cheap to clone; every clone feeds the same channel.
#[derive(Clone)]
pub struct InboundQueue {
    tx: Sender<Message>,
    /// Held only to evict the oldest entry under `DropOldest`
    evict_rx: Receiver<Message>,
    drop_policy: DropPolicy,
    metrics: Arc<IngestionMetrics>,
}

impl InboundQueue {
    /// Create the queue and its consumer end
    pub fn new(config: &BackpressureConfig) -> (Self, Receiver<Message>) {
        let (tx, rx) = bounded(config.channel_capacity.max(1));
        let queue = Self {
            tx,
            evict_rx: rx.clone(),
            drop_policy: config.drop_policy,
            metrics: Arc::new(IngestionMetrics::new()),
        };
        (queue, rx)
    }

    /// Push a message, applying the drop policy when full
    ///
    /// Returns `true` if the message was enqueued.
    pub fn push(&self, message: Message, source_id: &str) -> bool {
        let accepted = match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => self.push_full(message, source_id),
            Err(TrySendError::Closed(_)) => {
                trace!(source = %source_id, "inbound queue closed, message discarded");
                false
            }
        };

        if accepted {
            self.metrics.record_received();
            observability::record_message_received(source_id);
        }
        self.metrics.update_queue_len(self.tx.len());
        observability::record_inbound_queue_depth(self.tx.len());
        accepted
    }

    fn push_full(&self, mut message: Message, source_id: &str) -> bool {
        match self.drop_policy {
            DropPolicy::DropNewest => {
                self.record_drop(source_id, &message.address, "drop_newest");
                false
            }
            DropPolicy::DropOldest => {
                for _ in 0..MAX_EVICT_ATTEMPTS {
                    if let Ok(evicted) = self.evict_rx.try_recv() {
                        self.record_drop(source_id, &evicted.address, "drop_oldest");
                    }
                    match self.tx.try_send(message) {
                        Ok(()) => return true,
                        Err(TrySendError::Full(back)) => message = back,
                        Err(TrySendError::Closed(_)) => return false,
                    }
                }
                // Lost the race against other producers every time
                self.record_drop(source_id, &message.address, "drop_newest");
                false
            }
        }
    }

    fn record_drop(&self, source_id: &str, address: &str, policy: &'static str) {
        self.metrics.record_dropped();
        observability::record_message_dropped(policy);
        warn!(source = %source_id, address = %address, policy, "Inbound queue full, message dropped");
    }

    /// Record a decode failure attributed to `source_id`
    pub fn record_malformed(&self, source_id: &str) {
        self.metrics.record_malformed();
        observability::record_message_malformed(source_id);
    }

    /// Close the queue; consumers drain what is left, producers are rejected
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Shared metrics
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        Arc::clone(&self.metrics)
    }
}
