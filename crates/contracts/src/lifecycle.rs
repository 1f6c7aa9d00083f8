//! Lifecycle - host-facing control of a relay instance
//!
//! The relay core never depends on this; it is the adapter layer a host
//! (CLI, plugin shim) drives.

use crate::{RelayBlueprint, RelayError};

/// Relay run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Running,
}

/// Start/stop/configure contract
#[trait_variant::make(Lifecycle: Send)]
pub trait LocalLifecycle {
    /// Current state
    fn state(&self) -> LifecycleState;

    /// Bind transports and start the relay; no-op when already running
    async fn start(&mut self) -> Result<(), RelayError>;

    /// Stop the relay, closing the inbound channel; no-op when stopped
    async fn stop(&mut self) -> Result<(), RelayError>;

    /// Apply a new configuration
    ///
    /// While running, destinations are reconciled in place; listener and
    /// HTTP settings take effect on the next `start`.
    async fn configure(&mut self, options: RelayBlueprint) -> Result<(), RelayError>;
}
