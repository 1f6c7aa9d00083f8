//! SinkHandle - manages a destination sink with isolated queue and worker task

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{Delivery, DestinationId, EventSink, Message, RelayError};
use observability::DeliveryStatus;

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Destination this sink serves
    destination: DestinationId,
    /// Sink name
    name: String,
    /// Channel to send deliveries to worker
    tx: mpsc::Sender<Delivery>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Every `write` is bounded by `delivery_timeout`.
    pub fn spawn<S: EventSink + Send + 'static>(
        destination: DestinationId,
        sink: S,
        queue_capacity: usize,
        delivery_timeout: Duration,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = SinkWorker {
            destination: destination.clone(),
            metrics: Arc::clone(&metrics),
            delivery_timeout,
        };
        let worker_handle = tokio::spawn(worker.run(sink, rx));

        Self {
            destination,
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Destination served by this handle
    pub fn destination(&self) -> &DestinationId {
        &self.destination
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Enqueue a message for the worker (non-blocking)
    ///
    /// # Errors
    /// `SinkDelivery` when the queue is full or the worker has stopped.
    pub fn try_send(&self, message: Arc<Message>) -> Result<(), RelayError> {
        let permit = match self.tx.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                self.metrics.inc_dropped_count();
                observability::record_delivery(&self.destination, DeliveryStatus::Rejected);
                warn!(
                    destination = %self.destination,
                    address = %message.address,
                    "Sink queue full, message dropped"
                );
                return Err(RelayError::sink_delivery(
                    self.destination.as_str(),
                    "sink queue full",
                ));
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                error!(destination = %self.destination, "Sink worker closed unexpectedly");
                return Err(RelayError::sink_delivery(
                    self.destination.as_str(),
                    "sink worker stopped",
                ));
            }
        };

        permit.send(Delivery {
            destination: self.destination.clone(),
            sequence: self.metrics.next_sequence(),
            message,
        });
        let queued = self.tx.max_capacity() - self.tx.capacity();
        self.metrics.set_queue_len(queued);
        observability::record_sink_queue_depth(&self.destination, queued);
        Ok(())
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Already-queued deliveries are still written before the sink closes.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(destination = %self.destination))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(destination = %self.destination, error = ?e, "Worker task panicked");
        }
        debug!(destination = %self.destination, "SinkHandle shutdown complete");
    }
}

struct SinkWorker {
    destination: DestinationId,
    metrics: Arc<SinkMetrics>,
    delivery_timeout: Duration,
}

impl SinkWorker {
    /// Worker task that consumes deliveries and writes to sink
    #[instrument(
        name = "sink_worker_loop",
        skip(self, sink, rx),
        fields(destination = %self.destination)
    )]
    async fn run<S: EventSink>(self, mut sink: S, mut rx: mpsc::Receiver<Delivery>) {
        debug!(sink = %sink.name(), "Sink worker started");

        while let Some(delivery) = rx.recv().await {
            self.metrics.set_queue_len(rx.len());
            self.write_one(&mut sink, &delivery).await;
        }

        // Cleanup
        if let Err(e) = sink.flush().await {
            error!(sink = %sink.name(), error = %e, "Flush failed on shutdown");
        }
        if let Err(e) = sink.close().await {
            error!(sink = %sink.name(), error = %e, "Close failed on shutdown");
        }

        debug!(sink = %sink.name(), "Sink worker stopped");
    }

    async fn write_one<S: EventSink>(&self, sink: &mut S, delivery: &Delivery) {
        let started = Instant::now();
        let status = match tokio::time::timeout(self.delivery_timeout, sink.write(delivery)).await {
            Ok(Ok(())) => {
                self.metrics.inc_write_count();
                DeliveryStatus::Success
            }
            Ok(Err(e)) => {
                self.metrics.inc_failure_count();
                error!(
                    destination = %self.destination,
                    sequence = delivery.sequence,
                    error = %e,
                    "Write failed"
                );
                // Continue processing - a single failure never stops the worker
                DeliveryStatus::Failure
            }
            Err(_) => {
                self.metrics.inc_timeout_count();
                warn!(
                    destination = %self.destination,
                    sequence = delivery.sequence,
                    timeout_ms = self.delivery_timeout.as_millis() as u64,
                    "Write timed out"
                );
                DeliveryStatus::Timeout
            }
        };

        observability::record_delivery(&self.destination, status);
        observability::record_delivery_latency_ms(
            &self.destination,
            started.elapsed().as_secs_f64() * 1000.0,
        );
    }
}
