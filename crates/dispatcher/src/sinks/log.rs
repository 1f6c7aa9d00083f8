//! LogSink - logs each delivery via tracing

use contracts::{Delivery, EventSink, RelayError};
use tracing::{info, instrument};

/// Sink that logs deliveries for debugging
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, delivery),
        fields(sink = %self.name, sequence = delivery.sequence)
    )]
    async fn write(&mut self, delivery: &Delivery) -> Result<(), RelayError> {
        info!(
            destination = %delivery.destination,
            address = %delivery.message.address,
            type_tags = %delivery.message.type_tags(),
            args = ?delivery.message.args,
            "Message delivered"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), RelayError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), RelayError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
