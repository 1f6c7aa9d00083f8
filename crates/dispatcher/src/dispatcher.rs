//! Dispatcher - fan-out of inbound messages to matching destinations

use std::sync::Arc;
use std::time::Instant;

use async_channel::Receiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use contracts::{DestinationId, Message, RelayError, SinkAdapter};
use observability::RelayMetricsAggregator;

use crate::registry::Registry;

/// Outcome of dispatching one message
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Destinations whose filter matched
    pub matched: usize,
    /// Destinations that accepted the message, in registry order
    pub delivered: Vec<DestinationId>,
    /// Destinations that matched but could not accept it
    pub failures: Vec<(DestinationId, RelayError)>,
}

impl DispatchReport {
    /// Number of destinations reached
    pub fn delivered(&self) -> usize {
        self.delivered.len()
    }

    /// Whether every matched destination was reached
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Routes each message to every binding whose filter matches
///
/// Cheap to clone; clones share the registry and the adapter.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    adapter: Arc<dyn SinkAdapter>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` delivering through `adapter`
    pub fn new(registry: Arc<Registry>, adapter: Arc<dyn SinkAdapter>) -> Self {
        Self { registry, adapter }
    }

    /// Registry consulted on every dispatch
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `message` once to each matching destination
    ///
    /// Iterates one registry snapshot in insertion order. A failed delivery
    /// is recorded in the report and fan-out continues.
    ///
    /// # Errors
    /// `RegistryUnavailable` when the registry cannot be read.
    pub fn dispatch(&self, message: impl Into<Arc<Message>>) -> Result<DispatchReport, RelayError> {
        let message = message.into();
        let bindings = self.registry.snapshot()?;
        let mut report = DispatchReport::default();

        for binding in bindings.iter().filter(|b| b.matches(&message)) {
            report.matched += 1;
            match self.adapter.deliver(&binding.destination, binding.apply(&message)) {
                Ok(()) => report.delivered.push(binding.destination.clone()),
                Err(e) => {
                    warn!(
                        destination = %binding.destination,
                        address = %message.address,
                        error = %e,
                        "Delivery failed"
                    );
                    report.failures.push((binding.destination.clone(), e));
                }
            }
        }

        trace!(
            address = %message.address,
            matched = report.matched,
            delivered = report.delivered(),
            "Message dispatched"
        );
        observability::record_dispatch(report.matched, report.delivered());
        Ok(report)
    }

    /// Run the dispatch loop
    ///
    /// Consumes `input` until it closes or `shutdown` flips to `true`.
    /// On shutdown, messages still queued are discarded.
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run(
        &self,
        input: Receiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RelayMetricsAggregator {
        info!(bindings = self.registry.len(), "Dispatcher started");
        let mut aggregator = RelayMetricsAggregator::new();

        loop {
            if *shutdown.borrow() {
                self.discard_pending(&input);
                break;
            }

            let message = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.discard_pending(&input);
                        break;
                    }
                    continue;
                }
                received = input.recv() => match received {
                    Ok(message) => message,
                    Err(_) => {
                        debug!("Inbound queue closed");
                        break;
                    }
                },
            };

            let started = Instant::now();
            match self.dispatch(message) {
                Ok(report) => aggregator.update(
                    report.delivered.iter().map(|d| d.as_str()),
                    report.failures.len(),
                    started.elapsed().as_secs_f64() * 1000.0,
                ),
                // Never fatal: the next message gets a fresh snapshot
                Err(e) => warn!(error = %e, "Dispatch failed"),
            }

            if aggregator.total_messages % 1000 == 0 && aggregator.total_messages > 0 {
                debug!(messages = aggregator.total_messages, "Dispatcher progress");
            }
        }

        info!(
            messages = aggregator.total_messages,
            "Dispatcher stopped"
        );
        aggregator
    }

    /// Spawn the dispatch loop as a background task
    pub fn spawn(
        &self,
        input: Receiver<Message>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<RelayMetricsAggregator> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(input, shutdown).await })
    }

    fn discard_pending(&self, input: &Receiver<Message>) {
        let mut discarded = 0usize;
        while input.try_recv().is_ok() {
            discarded += 1;
            observability::record_message_dropped("shutdown");
        }
        if discarded > 0 {
            info!(discarded, "Discarded queued messages on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Transform;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Adapter recording every delivery
    #[derive(Default)]
    struct RecordingAdapter {
        deliveries: Mutex<Vec<(String, String)>>,
        fail_for: Option<&'static str>,
    }

    impl RecordingAdapter {
        fn taken(&self) -> Vec<(String, String)> {
            std::mem::take(&mut *self.deliveries.lock().unwrap())
        }
    }

    impl SinkAdapter for RecordingAdapter {
        fn deliver(&self, destination: &DestinationId, message: Arc<Message>) -> Result<(), RelayError> {
            if self.fail_for == Some(destination.as_str()) {
                return Err(RelayError::sink_delivery(destination.as_str(), "boom"));
            }
            self.deliveries
                .lock()
                .unwrap()
                .push((destination.to_string(), message.address.clone()));
            Ok(())
        }
    }

    fn scenario(adapter: Arc<RecordingAdapter>) -> Dispatcher {
        let registry = Arc::new(Registry::new());
        registry.register_raw("A", "/4/toggle1", Transform::PassThrough, None).unwrap();
        registry.register_raw("B", "/4/*", Transform::PassThrough, None).unwrap();
        Dispatcher::new(registry, adapter)
    }

    #[test]
    fn test_fanout_to_every_match() {
        let adapter = Arc::new(RecordingAdapter::default());
        let dispatcher = scenario(Arc::clone(&adapter));

        let report = dispatcher.dispatch(Message::bare("/4/toggle1")).unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, vec!["A", "B"]);
        assert_eq!(
            adapter.taken(),
            vec![
                ("A".to_string(), "/4/toggle1".to_string()),
                ("B".to_string(), "/4/toggle1".to_string()),
            ]
        );

        let report = dispatcher.dispatch(Message::bare("/5/toggle1")).unwrap();
        assert_eq!(report.matched, 0);
        assert!(adapter.taken().is_empty());
    }

    #[test]
    fn test_failure_does_not_stop_fanout() {
        let adapter = Arc::new(RecordingAdapter {
            fail_for: Some("A"),
            ..Default::default()
        });
        let dispatcher = scenario(Arc::clone(&adapter));

        let report = dispatcher.dispatch(Message::bare("/4/toggle1")).unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, vec!["B"]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_transform_applied_per_binding() {
        let adapter = Arc::new(RecordingAdapter::default());
        let registry = Arc::new(Registry::new());
        registry.register_raw("raw", "/4/*", Transform::PassThrough, None).unwrap();
        registry.register_raw("stripped", "/4/*", Transform::StripPrefix, None).unwrap();
        let dispatcher = Dispatcher::new(registry, adapter.clone());

        dispatcher.dispatch(Message::bare("/4/fader1")).unwrap();
        assert_eq!(
            adapter.taken(),
            vec![
                ("raw".to_string(), "/4/fader1".to_string()),
                ("stripped".to_string(), "/fader1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_until_input_closes() {
        let adapter = Arc::new(RecordingAdapter::default());
        let dispatcher = scenario(Arc::clone(&adapter));
        let (tx, rx) = async_channel::bounded(8);
        let (_stop_tx, stop_rx) = watch::channel(false);

        tx.send(Message::bare("/4/toggle1")).await.unwrap();
        tx.send(Message::bare("/4/other")).await.unwrap();
        tx.send(Message::bare("/nowhere")).await.unwrap();
        tx.close();

        let summary = dispatcher.run(rx, stop_rx).await.summary();
        assert_eq!(summary.total_messages, 3);
        assert_eq!(summary.unmatched_messages, 1);
        assert_eq!(summary.total_delivered, 3);
    }

    #[tokio::test]
    async fn test_shutdown_discards_queued_messages() {
        let adapter = Arc::new(RecordingAdapter::default());
        let dispatcher = scenario(Arc::clone(&adapter));
        let (tx, rx) = async_channel::bounded(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        stop_tx.send(true).unwrap();
        for _ in 0..3 {
            tx.send(Message::bare("/4/toggle1")).await.unwrap();
        }

        let handle = dispatcher.spawn(rx.clone(), stop_rx);
        let aggregator = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(aggregator.total_messages, 0);
        assert!(adapter.taken().is_empty());
        assert!(rx.is_empty());
    }
}
