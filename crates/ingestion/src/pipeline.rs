//! Ingestion Pipeline main entry

use std::collections::HashMap;
use std::sync::Arc;

use async_channel::Receiver;
use contracts::{Message, MessageCallback, MessageSource};
use tracing::{debug, info, instrument};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::queue::InboundQueue;

/// Ingestion Pipeline
///
/// Owns the shared inbound queue and the callback-driven sources feeding it.
/// The UDP listener pushes into the same queue through [`IngestionPipeline::queue`].
pub struct IngestionPipeline {
    /// Registered sources
    sources: HashMap<String, Box<dyn MessageSource>>,

    /// Shared inbound queue
    queue: InboundQueue,

    /// Consumer end, handed to the dispatcher once
    rx: Option<Receiver<Message>>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    pub fn new(config: BackpressureConfig) -> Self {
        let (queue, rx) = InboundQueue::new(&config);
        Self {
            sources: HashMap::new(),
            queue,
            rx: Some(rx),
        }
    }

    /// Register a callback-driven source
    ///
    /// Replaces (and stops) any source already registered under the same id.
    #[instrument(
        name = "ingestion_register_source",
        skip(self, source),
        fields(source_id = %source.source_id())
    )]
    pub fn register_source(&mut self, source: Box<dyn MessageSource>) {
        let source_id = source.source_id().to_string();
        if let Some(previous) = self.sources.insert(source_id.clone(), source) {
            previous.stop();
        }
        debug!(source_id = %source_id, "registered message source");
    }

    /// Start all registered sources
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&self) {
        info!(count = self.sources.len(), "starting all message sources");
        for (source_id, source) in &self.sources {
            if !source.is_listening() {
                debug!(source_id = %source_id, "starting source");
                source.listen(self.callback_for(source_id));
            }
        }
    }

    /// Stop all sources
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub fn stop_all(&self) {
        info!(count = self.sources.len(), "stopping all message sources");
        for (source_id, source) in &self.sources {
            if source.is_listening() {
                debug!(source_id = %source_id, "stopping source");
                source.stop();
            }
        }
    }

    fn callback_for(&self, source_id: &str) -> MessageCallback {
        let queue = self.queue.clone();
        let source_id = source_id.to_string();
        Arc::new(move |message| {
            queue.push(message, &source_id);
        })
    }

    /// Producer handle for the shared queue
    pub fn queue(&self) -> InboundQueue {
        self.queue.clone()
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<Message>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.queue.metrics()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if specified source is listening
    pub fn is_source_listening(&self, source_id: &str) -> bool {
        self.sources
            .get(source_id)
            .is_some_and(|s| s.is_listening())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}
