//! Relay orchestrator - wires listener, queue, dispatcher, sinks and the
//! HTTP gateway, and drives them through the host lifecycle.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use contracts::{DestinationConfig, Lifecycle, LifecycleState, RelayBlueprint, RelayError};
use dispatcher::{DispatcherError, EventHub, RelayControl};
use gateway::AppState;
use ingestion::{BackpressureConfig, IngestionPipeline, MidiBridge, MidiOutputs, OscUdpListener};
use observability::RelayMetricsAggregator;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::RelayStats;
use crate::error::CliError;

/// Relay host
///
/// Holds the active blueprint while stopped and the running tasks while
/// started. The event hub outlives restarts so SSE subscribers keep their
/// stream across a stop/start.
pub struct Relay {
    blueprint: RelayBlueprint,
    hub: EventHub,
    running: Option<RunningRelay>,
    last_stats: Option<RelayStats>,
}

struct RunningRelay {
    control: RelayControl,
    ingestion: IngestionPipeline,
    midi: Vec<MidiBridge>,
    midi_outputs: MidiOutputs,
    midi_inputs: MidiInputs,
    shutdown_tx: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<RelayMetricsAggregator>,
    gateway_task: Option<JoinHandle<()>>,
    osc_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    started: Instant,
}

const GATEWAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Destination changes applied by [`reconcile`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

fn relay_error(error: DispatcherError) -> RelayError {
    match error {
        DispatcherError::Relay(e) => e,
        other => RelayError::Other(other.to_string()),
    }
}

impl Relay {
    pub fn new(blueprint: RelayBlueprint) -> Self {
        Self {
            blueprint,
            hub: EventHub::default(),
            running: None,
            last_stats: None,
        }
    }

    /// Active blueprint
    #[cfg(test)]
    pub fn blueprint(&self) -> &RelayBlueprint {
        &self.blueprint
    }

    /// Bound OSC listener address while running
    pub fn osc_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.osc_addr)
    }

    /// Bound HTTP address while running with the API enabled
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().and_then(|r| r.http_addr)
    }

    /// Administrative handle while running
    #[cfg(test)]
    pub fn control(&self) -> Option<&RelayControl> {
        self.running.as_ref().map(|r| &r.control)
    }

    /// MIDI bridge for a configured device while running
    #[cfg(test)]
    pub fn midi_bridge(&self, device: &str) -> Option<MidiBridge> {
        self.running
            .as_ref()
            .and_then(|r| r.midi.iter().find(|b| b.device() == device).cloned())
    }

    /// Statistics of the most recent completed run
    #[cfg(test)]
    pub fn last_stats(&self) -> Option<&RelayStats> {
        self.last_stats.as_ref()
    }

    /// Stop and return the statistics of this run
    pub async fn shutdown(mut self) -> Result<RelayStats, RelayError> {
        self.stop().await?;
        self.last_stats
            .take()
            .ok_or_else(|| CliError::NotRunning.into())
    }
}

/// Connected MIDI input ports; dropping them disconnects
#[cfg(feature = "midi-ports")]
type MidiInputs = Vec<ingestion::MidiInputPort>;
#[cfg(not(feature = "midi-ports"))]
type MidiInputs = ();

/// Open the hardware ports of every device that names one
///
/// A port that cannot be opened is logged and skipped; the device keeps
/// its bridge for host-fed bytes.
#[cfg(feature = "midi-ports")]
fn open_midi_ports(
    devices: &[contracts::MidiDeviceConfig],
    bridges: &[MidiBridge],
    outputs: &MidiOutputs,
) -> Vec<ingestion::MidiInputPort> {
    let mut inputs = Vec::new();
    for (device, bridge) in devices.iter().zip(bridges) {
        let Some(port) = device.port.as_deref() else {
            continue;
        };
        match ingestion::MidiInputPort::open(port, bridge.clone()) {
            Ok(input) => inputs.push(input),
            Err(e) => warn!(device = %device.name, error = %e, "MIDI input not opened"),
        }
        match ingestion::MidirOutPort::open(port) {
            Ok(output) => outputs.insert(device.event_name(), Box::new(output)),
            Err(e) => warn!(device = %device.name, error = %e, "MIDI output not opened"),
        }
    }
    inputs
}

#[cfg(feature = "midi-ports")]
fn close_midi_ports(inputs: MidiInputs) {
    for input in inputs {
        debug!(port = input.port_name(), "MIDI input closed");
    }
}

#[cfg(not(feature = "midi-ports"))]
fn close_midi_ports(_inputs: MidiInputs) {}

#[cfg(not(feature = "midi-ports"))]
fn open_midi_ports(
    devices: &[contracts::MidiDeviceConfig],
    _bridges: &[MidiBridge],
    _outputs: &MidiOutputs,
) -> MidiInputs {
    for device in devices.iter().filter(|d| d.port.is_some()) {
        warn!(
            device = %device.name,
            "Built without the midi-ports feature; port ignored, device only takes host-fed bytes"
        );
    }
}

impl Lifecycle for Relay {
    fn state(&self) -> LifecycleState {
        if self.running.is_some() {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    #[instrument(name = "relay_start", skip(self))]
    async fn start(&mut self) -> Result<(), RelayError> {
        if self.running.is_some() {
            debug!("Relay already running");
            return Ok(());
        }
        let blueprint = &self.blueprint;

        // 1. Bind transports first so a taken port leaves nothing behind
        let listener = OscUdpListener::bind(&blueprint.listener)
            .await
            .map_err(|e| CliError::bind("OSC listener", blueprint.listener.bind_addr(), e))?;
        let osc_addr = listener.local_addr();

        let http = match &blueprint.http {
            Some(http) => {
                let tcp = TcpListener::bind(http.bind_addr())
                    .await
                    .map_err(|e| CliError::bind("HTTP API", http.bind_addr(), e))?;
                let addr = tcp.local_addr()?;
                Some((tcp, addr, http.cors))
            }
            None => None,
        };

        // 2. Destinations and their sinks
        let control =
            RelayControl::build(blueprint.dispatch.clone(), self.hub.clone(), &blueprint.destinations)
                .await
                .map_err(relay_error)?;

        // 3. Inbound queue and host-fed MIDI sources
        let mut ingestion = IngestionPipeline::new(BackpressureConfig::from(&blueprint.listener));
        let midi: Vec<MidiBridge> = blueprint
            .midi_devices
            .iter()
            .map(|device| MidiBridge::new(device.name.as_str()))
            .collect();
        for bridge in &midi {
            ingestion.register_source(Box::new(bridge.clone()));
        }
        let input = ingestion
            .take_receiver()
            .ok_or_else(|| RelayError::Other("inbound receiver already taken".to_string()))?;
        ingestion.start_all();
        let midi_outputs = MidiOutputs::new();
        let midi_inputs = open_midi_ports(&blueprint.midi_devices, &midi, &midi_outputs);

        // 4. Tasks
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener_task = listener.spawn(ingestion.queue(), shutdown_rx.clone());
        let dispatcher_task = control.dispatcher().spawn(input, shutdown_rx.clone());
        let (gateway_task, http_addr) = match http {
            Some((tcp, addr, cors)) => (
                Some(gateway::spawn(
                    tcp,
                    AppState::new(control.clone()).with_midi(midi_outputs.clone()),
                    cors,
                    shutdown_rx,
                )),
                Some(addr),
            ),
            None => (None, None),
        };

        info!(
            %osc_addr,
            http_addr = ?http_addr,
            destinations = blueprint.destinations.len(),
            midi_devices = midi.len(),
            "Relay started"
        );

        self.running = Some(RunningRelay {
            control,
            ingestion,
            midi,
            midi_outputs,
            midi_inputs,
            shutdown_tx,
            listener_task,
            dispatcher_task,
            gateway_task,
            osc_addr,
            http_addr,
            started: Instant::now(),
        });
        Ok(())
    }

    #[instrument(name = "relay_stop", skip(self))]
    async fn stop(&mut self) -> Result<(), RelayError> {
        let Some(running) = self.running.take() else {
            debug!("Relay already stopped");
            return Ok(());
        };

        running.shutdown_tx.send_replace(true);
        close_midi_ports(running.midi_inputs);
        running.ingestion.stop_all();
        running.midi_outputs.clear();
        debug!(midi_devices = running.midi.len(), "Inbound sources stopped");
        let queue = running.ingestion.queue();
        queue.close();

        if let Err(e) = running.listener_task.await {
            warn!(error = %e, "Listener task failed");
        }
        if let Some(mut task) = running.gateway_task {
            // Open SSE streams never finish on their own
            match tokio::time::timeout(GATEWAY_DRAIN_TIMEOUT, &mut task).await {
                Ok(Err(e)) => warn!(error = %e, "HTTP gateway task failed"),
                Ok(Ok(())) => {}
                Err(_) => {
                    debug!("HTTP connections still open, aborting gateway");
                    task.abort();
                }
            }
        }
        let dispatch = match running.dispatcher_task.await {
            Ok(aggregator) => aggregator,
            Err(e) => {
                warn!(error = %e, "Dispatcher task failed");
                RelayMetricsAggregator::default()
            }
        };

        let sinks = running.control.metrics();
        running.control.shutdown().await;

        let stats = RelayStats {
            duration: running.started.elapsed(),
            ingestion: queue.metrics().snapshot(),
            dispatch,
            sinks,
        };
        info!(
            messages = stats.dispatch.total_messages,
            duration_secs = stats.duration.as_secs_f64(),
            "Relay stopped"
        );
        self.last_stats = Some(stats);
        Ok(())
    }

    #[instrument(name = "relay_configure", skip_all)]
    async fn configure(&mut self, options: RelayBlueprint) -> Result<(), RelayError> {
        config_loader::ConfigLoader::validate(&options)?;

        if let Some(running) = &self.running {
            let report = reconcile(
                &running.control,
                &self.blueprint.destinations,
                &options.destinations,
            )
            .await?;
            info!(
                added = report.added,
                updated = report.updated,
                removed = report.removed,
                "Destinations reconciled"
            );
            if options.listener.bind_addr() != self.blueprint.listener.bind_addr()
                || options.http.as_ref().map(|h| h.bind_addr())
                    != self.blueprint.http.as_ref().map(|h| h.bind_addr())
            {
                info!("Listener and HTTP address changes apply on next start");
            }
        }

        self.blueprint = options;
        Ok(())
    }
}

/// Bring a running relay from `current` destinations to `desired`
///
/// Removed ids are unregistered first; new or changed ones are (re)registered
/// in `desired` order. Unchanged destinations keep their sink.
pub async fn reconcile(
    control: &RelayControl,
    current: &[DestinationConfig],
    desired: &[DestinationConfig],
) -> Result<ReconcileReport, RelayError> {
    let mut report = ReconcileReport::default();
    let keep: HashSet<&str> = desired.iter().map(|d| d.id.as_str()).collect();

    for old in current.iter().filter(|d| !keep.contains(d.id.as_str())) {
        if control
            .unregister_destination(&old.id)
            .await
            .map_err(relay_error)?
        {
            report.removed += 1;
        }
    }

    for new in desired {
        match current.iter().find(|d| d.id == new.id) {
            Some(old) if old == new => continue,
            Some(_) => report.updated += 1,
            None => report.added += 1,
        }
        control
            .register_destination(new)
            .await
            .map_err(relay_error)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DispatchConfig, ListenerConfig, Message, OscArg};
    use tokio::net::UdpSocket;

    fn destination(id: &str, filter: &str) -> DestinationConfig {
        DestinationConfig {
            id: id.to_string(),
            filter: filter.to_string(),
            transform: Default::default(),
            reply_to: None,
            sink: Default::default(),
        }
    }

    fn blueprint(destinations: Vec<DestinationConfig>) -> RelayBlueprint {
        RelayBlueprint {
            listener: ListenerConfig {
                port: 0,
                ..ListenerConfig::default()
            },
            destinations,
            ..RelayBlueprint::default()
        }
    }

    /// Blueprint for `configure`: validated, so it keeps a real port
    fn options(destinations: Vec<DestinationConfig>) -> RelayBlueprint {
        RelayBlueprint {
            destinations,
            ..RelayBlueprint::default()
        }
    }

    #[tokio::test]
    async fn test_start_dispatch_stop() {
        let mut relay = Relay::new(blueprint(vec![
            destination("A", "/4/toggle1"),
            destination("B", "/4/*"),
        ]));
        assert_eq!(relay.state(), LifecycleState::Stopped);

        relay.start().await.unwrap();
        relay.start().await.unwrap();
        assert_eq!(relay.state(), LifecycleState::Running);
        let addr = relay.osc_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = ingestion::codec::encode_message(&Message::new(
            "/4/toggle1",
            vec![OscArg::Float(1.0)],
        ));
        sender.send_to(&packet, addr).await.unwrap();

        let control = relay.control().unwrap().clone();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let written: u64 = control.metrics().iter().map(|(_, m)| m.write_count).sum();
                if written == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        relay.stop().await.unwrap();
        relay.stop().await.unwrap();
        assert_eq!(relay.state(), LifecycleState::Stopped);
        let stats = relay.last_stats().unwrap();
        assert_eq!(stats.ingestion.messages_received, 1);
        assert_eq!(stats.dispatch.total_delivered, 2);
    }

    #[tokio::test]
    async fn test_configure_reconciles_running_relay() {
        let mut relay = Relay::new(blueprint(vec![
            destination("A", "/a"),
            destination("B", "/b"),
        ]));
        relay.start().await.unwrap();

        let mut changed = destination("B", "/b/*");
        changed.sink.queue_capacity = Some(8);
        relay
            .configure(options(vec![changed, destination("C", "/c")]))
            .await
            .unwrap();

        let ids: Vec<_> = relay
            .control()
            .unwrap()
            .list()
            .unwrap()
            .into_iter()
            .map(|b| (b.destination.to_string(), b.filter.to_string()))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("B".to_string(), "/b/*".to_string()),
                ("C".to_string(), "/c".to_string()),
            ]
        );
        relay.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_counts() {
        let control = RelayControl::new(DispatchConfig::default(), EventHub::default());
        let current = vec![destination("A", "/a"), destination("B", "/b")];
        reconcile(&control, &[], &current).await.unwrap();

        let desired = vec![destination("A", "/a"), destination("B", "/b2"), destination("C", "*")];
        let report = reconcile(&control, &current, &desired).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                added: 1,
                updated: 1,
                removed: 0
            }
        );

        let report = reconcile(&control, &desired, &[]).await.unwrap();
        assert_eq!(report.removed, 3);
        assert!(control.list().unwrap().is_empty());
        control.shutdown().await;
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_blueprint() {
        let mut relay = Relay::new(blueprint(vec![]));
        let err = relay
            .configure(options(vec![destination("A", "bad")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidFilter { .. } | RelayError::ConfigValidation { .. }
        ));
        assert!(relay.blueprint().destinations.is_empty());
    }

    #[tokio::test]
    async fn test_midi_bridge_feeds_dispatcher() {
        let mut bp = blueprint(vec![destination("M", "/midi/*")]);
        bp.midi_devices.push(contracts::MidiDeviceConfig::named("pad"));
        let mut relay = Relay::new(bp);
        relay.start().await.unwrap();

        let bridge = relay.midi_bridge("pad").unwrap();
        bridge.feed(&[0x90, 60, 100]).unwrap();

        let stats = relay.shutdown().await.unwrap();
        assert_eq!(stats.ingestion.messages_received, 1);
    }

    #[tokio::test]
    async fn test_unavailable_midi_port_keeps_bridge() {
        let mut bp = blueprint(vec![destination("M", "/midi/*")]);
        let mut device = contracts::MidiDeviceConfig::named("pad");
        device.port = Some("no such port".to_string());
        bp.midi_devices.push(device);
        let mut relay = Relay::new(bp);
        relay.start().await.unwrap();

        relay.midi_bridge("pad").unwrap().feed(&[0xB0, 1, 2]).unwrap();
        let stats = relay.shutdown().await.unwrap();
        assert_eq!(stats.ingestion.messages_received, 1);
    }
}
