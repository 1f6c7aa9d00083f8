//! Sink implementations
//!
//! Contains LogSink, FileSink, NetworkSink and EventStreamSink, plus the
//! factory turning a `DestinationConfig` into a running `SinkHandle`.

mod event_stream;
mod file;
mod log;
mod network;

use std::time::Duration;

use contracts::{DestinationConfig, DispatchConfig, Delivery, OscArg, SinkType};
use serde::Serialize;
use tracing::instrument;

pub use self::event_stream::{BrowserEvent, EventHub, EventStreamSink};
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;

/// Serialized form of a delivery (JSON lines, JSON/bincode datagrams)
#[derive(Debug, Serialize)]
pub struct DeliveryRecord<'a> {
    pub destination: &'a str,
    pub sequence: u64,
    pub address: &'a str,
    pub arguments: &'a [OscArg],
}

impl<'a> From<&'a Delivery> for DeliveryRecord<'a> {
    fn from(delivery: &'a Delivery) -> Self {
        Self {
            destination: delivery.destination.as_str(),
            sequence: delivery.sequence,
            address: &delivery.message.address,
            arguments: &delivery.message.args,
        }
    }
}

/// Create a SinkHandle from a destination's configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, dispatch, hub),
    fields(destination = %config.id, sink_type = ?config.sink.sink_type)
)]
pub async fn create_sink_handle(
    config: &DestinationConfig,
    dispatch: &DispatchConfig,
    hub: &EventHub,
) -> Result<SinkHandle, DispatcherError> {
    let destination = config.id.as_str().into();
    let capacity = config
        .sink
        .queue_capacity
        .unwrap_or(dispatch.default_queue_capacity);
    let timeout = Duration::from_millis(dispatch.delivery_timeout_ms);

    match config.sink.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.id);
            Ok(SinkHandle::spawn(destination, sink, capacity, timeout))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.id, &config.sink.params)
                .map_err(|e| DispatcherError::sink_creation(&config.id, e.to_string()))?;
            Ok(SinkHandle::spawn(destination, sink, capacity, timeout))
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.id, &config.sink.params)
                .await
                .map_err(|e| DispatcherError::sink_creation(&config.id, e.to_string()))?;
            Ok(SinkHandle::spawn(destination, sink, capacity, timeout))
        }
        SinkType::EventStream => {
            let sink = EventStreamSink::new(&config.id, config.event_name(), hub.clone());
            Ok(SinkHandle::spawn(destination, sink, capacity, timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Message, SinkConfig};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn destination(sink_type: SinkType, params: HashMap<String, String>) -> DestinationConfig {
        DestinationConfig {
            id: "A".to_string(),
            filter: "*".to_string(),
            transform: Default::default(),
            reply_to: None,
            sink: SinkConfig {
                sink_type,
                queue_capacity: Some(4),
                params,
            },
        }
    }

    #[tokio::test]
    async fn test_create_event_stream_handle() {
        let hub = EventHub::new(8);
        let mut events = hub.subscribe();
        let config = destination(
            SinkType::EventStream,
            HashMap::from([("event_name".to_string(), "osc_event_0".to_string())]),
        );

        let handle = create_sink_handle(&config, &DispatchConfig::default(), &hub)
            .await
            .unwrap();
        handle
            .try_send(Arc::new(Message::new("/4/toggle1", vec![1.0f32.into()])))
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.destination, "A");
        assert_eq!(event.event_name, "osc_event_0");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_network_handle_requires_addr() {
        let config = destination(SinkType::Network, HashMap::new());
        let err = create_sink_handle(&config, &DispatchConfig::default(), &EventHub::new(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { .. }));
    }

    #[test]
    fn test_delivery_record_json() {
        let delivery = Delivery {
            destination: "A".into(),
            sequence: 7,
            message: Arc::new(Message::new("/x", vec![OscArg::Int(3), OscArg::Nil])),
        };
        let json = serde_json::to_value(DeliveryRecord::from(&delivery)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "destination": "A",
                "sequence": 7,
                "address": "/x",
                "arguments": [3, null],
            })
        );
    }
}
