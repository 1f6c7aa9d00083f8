//! SinkRouter - production `SinkAdapter`
//!
//! Maps each destination to its `SinkHandle`. `deliver` only enqueues, so a
//! slow sink never holds up the dispatch loop or the other destinations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use contracts::{DestinationId, Message, RelayError, SinkAdapter};
use tracing::{debug, info, instrument};

use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;

/// Destination -> sink handle map
#[derive(Default)]
pub struct SinkRouter {
    handles: RwLock<HashMap<DestinationId, SinkHandle>>,
}

impl SinkRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handle` to its destination
    ///
    /// Returns the handle it replaced; the caller shuts that one down.
    #[instrument(name = "router_attach", skip(self, handle), fields(destination = %handle.destination()))]
    pub fn attach(&self, handle: SinkHandle) -> Result<Option<SinkHandle>, RelayError> {
        let mut handles = self.write()?;
        let previous = handles.insert(handle.destination().clone(), handle);
        debug!(replaced = previous.is_some(), "sink attached");
        Ok(previous)
    }

    /// Detach the handle for `destination`
    #[instrument(name = "router_detach", skip(self))]
    pub fn detach(&self, destination: &str) -> Result<Option<SinkHandle>, RelayError> {
        Ok(self.write()?.remove(destination))
    }

    /// Whether a sink is attached for `destination`
    pub fn contains(&self, destination: &str) -> bool {
        self.handles
            .read()
            .map(|h| h.contains_key(destination))
            .unwrap_or(false)
    }

    /// Metrics for all sinks, sorted by destination
    pub fn metrics(&self) -> Vec<(DestinationId, MetricsSnapshot)> {
        let mut out: Vec<_> = self
            .handles
            .read()
            .map(|handles| {
                handles
                    .iter()
                    .map(|(id, h)| (id.clone(), h.metrics().snapshot()))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        out
    }

    /// Detach every sink and wait for the workers to drain
    #[instrument(name = "router_shutdown_all", skip(self))]
    pub async fn shutdown_all(&self) {
        let handles: Vec<SinkHandle> = match self.handles.write() {
            Ok(mut guard) => guard.drain().map(|(_, h)| h).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, h)| h).collect(),
        };
        info!(sinks = handles.len(), "Shutting down sinks");
        for handle in handles {
            handle.shutdown().await;
        }
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<DestinationId, SinkHandle>>, RelayError>
    {
        self.handles
            .write()
            .map_err(|_| RelayError::Other("sink router lock poisoned".to_string()))
    }
}

impl SinkAdapter for SinkRouter {
    fn deliver(&self, destination: &DestinationId, message: Arc<Message>) -> Result<(), RelayError> {
        let handles = self
            .handles
            .read()
            .map_err(|_| RelayError::sink_delivery(destination.as_str(), "sink router lock poisoned"))?;
        match handles.get(destination) {
            Some(handle) => handle.try_send(message),
            None => Err(RelayError::sink_delivery(
                destination.as_str(),
                "no sink attached",
            )),
        }
    }
}
