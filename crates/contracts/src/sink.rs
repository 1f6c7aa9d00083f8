//! Sink traits - Dispatcher output interface
//!
//! `SinkAdapter` is the capability the dispatcher calls once per matched
//! destination. `EventSink` is the async writer behind a single destination.

use std::sync::Arc;

use crate::{DestinationId, Message, RelayError};

/// Outbound sink adapter injected into the dispatcher
///
/// `deliver` must not block: implementations enqueue and return. A failure
/// concerns only `destination` and never aborts fan-out to the others.
pub trait SinkAdapter: Send + Sync {
    /// Hand `message` to the sink bound to `destination`
    ///
    /// # Errors
    /// `SinkDelivery` when the destination cannot accept the message.
    fn deliver(&self, destination: &DestinationId, message: Arc<Message>) -> Result<(), RelayError>;
}

impl<T: SinkAdapter + ?Sized> SinkAdapter for Arc<T> {
    fn deliver(&self, destination: &DestinationId, message: Arc<Message>) -> Result<(), RelayError> {
        (**self).deliver(destination, message)
    }
}

/// A message addressed to one destination
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Target destination
    pub destination: DestinationId,
    /// Per-destination sequence number, starting at 1
    pub sequence: u64,
    /// Message after the binding's transform
    pub message: Arc<Message>,
}

/// Destination writer
///
/// All sink implementations must implement this trait.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one delivery
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, delivery: &Delivery) -> Result<(), RelayError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), RelayError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), RelayError>;
}
