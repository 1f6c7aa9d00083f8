//! Relay run statistics.

use std::time::Duration;

use contracts::DestinationId;
use observability::RelayMetricsAggregator;

/// Statistics from one start/stop cycle of the relay
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Time between start and stop
    pub duration: Duration,

    /// Inbound queue counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Dispatch loop aggregates
    pub dispatch: RelayMetricsAggregator,

    /// Per-destination sink counters at stop time
    pub sinks: Vec<(DestinationId, dispatcher::MetricsSnapshot)>,
}

impl RelayStats {
    /// Dispatched messages per second
    pub fn messages_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.dispatch.total_messages as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Inbound drop rate as a percentage of everything offered to the queue
    pub fn drop_rate(&self) -> f64 {
        let offered = self.ingestion.messages_received;
        if offered > 0 {
            self.ingestion.messages_dropped as f64 / offered as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Relay Statistics ===\n");
        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Messages received: {}", self.ingestion.messages_received);
        println!(
            "  Messages dropped: {} ({:.2}%)",
            self.ingestion.messages_dropped,
            self.drop_rate()
        );
        println!("  Malformed datagrams: {}", self.ingestion.malformed);
        println!("  Throughput: {:.2} msg/s", self.messages_per_sec());

        println!("\n{}", self.dispatch.summary());

        if !self.sinks.is_empty() {
            println!("Sinks");
            for (destination, m) in &self.sinks {
                println!(
                    "  {destination}: written={} failed={} timed_out={} dropped={}",
                    m.write_count, m.failure_count, m.timeout_count, m.dropped_count
                );
            }
        }
        println!();
    }
}
