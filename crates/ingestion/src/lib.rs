//! # Ingestion
//!
//! Inbound side of the relay.
//!
//! Responsibilities:
//! - Decode OSC datagrams (messages and bundles) and raw MIDI bytes into `Message`
//! - Receive UDP datagrams without ever blocking on downstream capacity
//! - Bounded inbound queue with drop policy
//! - Host callback sources (`MidiBridge`, mocks) via `IngestionPipeline`
//! - MIDI output ports addressed by event name (`MidiOutputs`)
//! - Hardware MIDI ports through `midir` (feature `midi-ports`)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{BackpressureConfig, IngestionPipeline, MidiBridge, OscUdpListener};
//!
//! let mut pipeline = IngestionPipeline::new(BackpressureConfig::from(&blueprint.listener));
//! let bridge = MidiBridge::new("launchpad");
//! pipeline.register_source(Box::new(bridge.clone()));
//! pipeline.start_all();
//!
//! let listener = OscUdpListener::bind(&blueprint.listener).await?;
//! listener.spawn(pipeline.queue(), shutdown_rx);
//!
//! let rx = pipeline.take_receiver().unwrap();
//! while let Ok(message) = rx.recv().await {
//!     // Dispatch message
//! }
//! ```

pub mod codec;
mod config;
mod error;
mod listener;
mod midi;
mod midi_out;
mod mock;
mod pipeline;
#[cfg(feature = "midi-ports")]
mod ports;
mod queue;

// Re-exports
pub use config::{BackpressureConfig, DropPolicy, IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use listener::{OscUdpListener, UDP_SOURCE_ID};
pub use midi::MidiBridge;
pub use midi_out::{MidiOutPort, MidiOutputs};
pub use mock::{MockMessageSource, MockSourceConfig};
pub use pipeline::IngestionPipeline;
#[cfg(feature = "midi-ports")]
pub use ports::{MidiInputPort, MidirOutPort};
pub use queue::InboundQueue;
