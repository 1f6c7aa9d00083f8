//! RelayControl - administrative interface
//!
//! Couples the registry with the sink router so a destination's binding and
//! its sink are created and torn down together, and sends outbound OSC to a
//! destination's reply address.
//!
//! Admin mutations are serialised by one async mutex. Dispatch never takes
//! it; it only reads the registry snapshot and the router.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use contracts::{Binding, DestinationConfig, DestinationId, DispatchConfig, Message, RelayError};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::dispatcher::Dispatcher;
use crate::error::DispatcherError;
use crate::metrics::MetricsSnapshot;
use crate::registry::Registry;
use crate::router::SinkRouter;
use crate::sinks::{create_sink_handle, EventHub};

/// Administrative handle over the registry and the sinks
///
/// Cheap to clone; all clones operate on the same relay.
#[derive(Clone)]
pub struct RelayControl {
    registry: Arc<Registry>,
    router: Arc<SinkRouter>,
    hub: EventHub,
    dispatch: DispatchConfig,
    /// event name -> destination id
    event_names: Arc<RwLock<HashMap<String, DestinationId>>>,
    admin: Arc<Mutex<()>>,
    outbound_v4: Arc<OnceCell<UdpSocket>>,
    outbound_v6: Arc<OnceCell<UdpSocket>>,
}

impl RelayControl {
    /// Create an empty relay
    pub fn new(dispatch: DispatchConfig, hub: EventHub) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            router: Arc::new(SinkRouter::new()),
            hub,
            dispatch,
            event_names: Arc::new(RwLock::new(HashMap::new())),
            admin: Arc::new(Mutex::new(())),
            outbound_v4: Arc::new(OnceCell::new()),
            outbound_v6: Arc::new(OnceCell::new()),
        }
    }

    /// Create a relay and register every destination in order
    #[instrument(name = "relay_control_build", skip_all, fields(destinations = destinations.len()))]
    pub async fn build(
        dispatch: DispatchConfig,
        hub: EventHub,
        destinations: &[DestinationConfig],
    ) -> Result<Self, DispatcherError> {
        let control = Self::new(dispatch, hub);
        for destination in destinations {
            control.register_destination(destination).await?;
        }
        Ok(control)
    }

    /// Dispatcher sharing this relay's registry and sinks
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.registry), self.router.clone())
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Browser event hub
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Register (or replace) a destination with its sink
    ///
    /// The sink is attached before the binding becomes visible, so a
    /// concurrent dispatch never matches a binding without a sink. A replaced
    /// sink is drained after the swap.
    ///
    /// # Errors
    /// `InvalidFilter` (registry unchanged) or sink creation failure.
    #[instrument(name = "relay_register_destination", skip(self, config), fields(destination = %config.id))]
    pub async fn register_destination(
        &self,
        config: &DestinationConfig,
    ) -> Result<Binding, DispatcherError> {
        let binding = config.to_binding()?;
        let handle = create_sink_handle(config, &self.dispatch, &self.hub).await?;

        let previous = {
            let _admin = self.admin.lock().await;
            let previous = self.router.attach(handle)?;
            if let Err(e) = self.registry.register(binding.clone()) {
                if let Some(orphan) = self.router.detach(&config.id)? {
                    orphan.shutdown().await;
                }
                return Err(e.into());
            }
            self.bind_event_name(&binding.destination, config.event_name())?;
            previous
        };
        if let Some(previous) = previous {
            previous.shutdown().await;
        }

        info!(
            filter = %binding.filter,
            transform = ?binding.transform,
            sink_type = ?config.sink.sink_type,
            event_name = config.event_name(),
            "Destination registered"
        );
        Ok(binding)
    }

    /// Remove a destination and drain its sink
    ///
    /// Returns `Ok(false)` when the destination was not registered.
    #[instrument(name = "relay_unregister_destination", skip(self))]
    pub async fn unregister_destination(&self, destination: &str) -> Result<bool, DispatcherError> {
        let (removed, handle) = {
            let _admin = self.admin.lock().await;
            let removed = self.registry.unregister(destination)?;
            let handle = self.router.detach(destination)?;
            self.event_names_mut()?.retain(|_, id| id.as_str() != destination);
            (removed, handle)
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        if removed {
            info!("Destination unregistered");
        }
        Ok(removed)
    }

    /// Whether a sink is attached for `destination`
    pub fn has_sink(&self, destination: &str) -> bool {
        self.router.contains(destination)
    }

    /// Destination id for an event name, falling back to the id itself
    pub fn resolve(&self, event_name: &str) -> Result<Option<Binding>, RelayError> {
        let id = self
            .event_names
            .read()
            .map_err(|_| RelayError::registry_unavailable("event name index poisoned"))?
            .get(event_name)
            .cloned();
        match id {
            Some(id) => self.registry.get(id.as_str()),
            None => self.registry.get(event_name),
        }
    }

    fn event_names_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, DestinationId>>, RelayError> {
        self.event_names
            .write()
            .map_err(|_| RelayError::registry_unavailable("event name index poisoned"))
    }

    fn bind_event_name(&self, destination: &DestinationId, event_name: &str) -> Result<(), RelayError> {
        let mut names = self.event_names_mut()?;
        names.retain(|_, id| *id != *destination);
        if let Some(other) = names.insert(event_name.to_string(), destination.clone()) {
            if other != *destination {
                warn!(event_name, previous = %other, "Event name taken over by another destination");
            }
        }
        Ok(())
    }

    /// Bindings in insertion order
    pub fn list(&self) -> Result<Vec<Binding>, RelayError> {
        self.registry.list()
    }

    /// Per-destination sink metrics
    pub fn metrics(&self) -> Vec<(contracts::DestinationId, MetricsSnapshot)> {
        self.router.metrics()
    }

    /// Encode `message` as OSC and send it to the reply address of the
    /// destination known by `event_name` (or by that id)
    ///
    /// # Errors
    /// - `DestinationNotFound` for an unknown event name or id
    /// - `NoReplyAddress` when the binding has no `reply_to`
    /// - `Io` when the datagram cannot be sent
    #[instrument(name = "relay_send", skip(self, message), fields(address = %message.address))]
    pub async fn send(&self, event_name: &str, message: &Message) -> Result<usize, RelayError> {
        let binding = self
            .resolve(event_name)?
            .ok_or_else(|| RelayError::destination_not_found(event_name))?;
        let target = binding.reply_to.ok_or_else(|| RelayError::NoReplyAddress {
            destination: binding.destination.to_string(),
        })?;

        let socket = self.outbound_socket(target).await?;
        let packet = ingestion::codec::encode_message(message);
        let sent = socket.send_to(&packet, target).await?;

        debug!(destination = %binding.destination, %target, bytes = sent, "Outbound OSC sent");
        Ok(sent)
    }

    /// Lazily bound socket of the target's address family
    async fn outbound_socket(&self, target: SocketAddr) -> std::io::Result<&UdpSocket> {
        if target.is_ipv4() {
            self.outbound_v4
                .get_or_try_init(|| UdpSocket::bind("0.0.0.0:0"))
                .await
        } else {
            self.outbound_v6
                .get_or_try_init(|| UdpSocket::bind("[::]:0"))
                .await
        }
    }

    /// Drain and close every sink
    pub async fn shutdown(&self) {
        self.router.shutdown_all().await;
    }
}
