//! EventStreamSink - publishes browser events on a broadcast hub
//!
//! Browser overlays subscribe through the gateway's SSE endpoint; each event
//! carries the destination's event name and the message as JSON.

use contracts::{Delivery, DestinationId, EventSink, RelayError};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Event published to browser subscribers
#[derive(Debug, Clone, Serialize)]
pub struct BrowserEvent {
    /// Destination the event belongs to
    #[serde(skip)]
    pub destination: DestinationId,
    /// Custom event name the overlay listens for
    #[serde(rename = "eventName")]
    pub event_name: String,
    /// `{"address": ..., "arguments": [...]}`
    pub detail: serde_json::Value,
}

/// Broadcast hub shared by every event-stream sink
///
/// Slow subscribers lag and lose events; publishers never wait.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<BrowserEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventHub {
    /// Create a hub buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; returns the number of subscribers reached
    pub fn publish(&self, event: BrowserEvent) -> usize {
        // No subscriber is not an error: overlays come and go
        self.tx.send(event).unwrap_or(0)
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Sink that turns deliveries into browser events
pub struct EventStreamSink {
    name: String,
    event_name: String,
    hub: EventHub,
}

impl EventStreamSink {
    /// Create a sink publishing under `event_name`
    pub fn new(name: impl Into<String>, event_name: impl Into<String>, hub: EventHub) -> Self {
        Self {
            name: name.into(),
            event_name: event_name.into(),
            hub,
        }
    }

    fn to_event(&self, delivery: &Delivery) -> Result<BrowserEvent, RelayError> {
        let detail = serde_json::to_value(&*delivery.message)
            .map_err(|e| RelayError::sink_delivery(delivery.destination.as_str(), e.to_string()))?;
        Ok(BrowserEvent {
            destination: delivery.destination.clone(),
            event_name: self.event_name.clone(),
            detail,
        })
    }
}

impl EventSink for EventStreamSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "event_stream_sink_write",
        skip(self, delivery),
        fields(sink = %self.name, sequence = delivery.sequence)
    )]
    async fn write(&mut self, delivery: &Delivery) -> Result<(), RelayError> {
        let event = self.to_event(delivery)?;
        let reached = self.hub.publish(event);
        trace!(event_name = %self.event_name, subscribers = reached, "Browser event published");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        debug!(sink = %self.name, "EventStreamSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Message, OscArg};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_publishes_browser_event() {
        let hub = EventHub::new(4);
        let mut rx = hub.subscribe();
        let mut sink = EventStreamSink::new("A", "osc_event_0", hub.clone());

        let delivery = Delivery {
            destination: "A".into(),
            sequence: 1,
            message: Arc::new(Message::new("/4/toggle1", vec![OscArg::Float(1.0)])),
        };
        sink.write(&delivery).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.destination, "A");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "eventName": "osc_event_0",
                "detail": { "address": "/4/toggle1", "arguments": [1.0] },
            })
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = EventHub::default();
        let mut sink = EventStreamSink::new("A", "a", hub.clone());
        let delivery = Delivery {
            destination: "A".into(),
            sequence: 1,
            message: Arc::new(Message::bare("/x")),
        };
        assert!(sink.write(&delivery).await.is_ok());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
