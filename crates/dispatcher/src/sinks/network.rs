//! NetworkSink - UDP fire-and-forget forwarding

use contracts::{Delivery, EventSink, RelayError};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};

use super::DeliveryRecord;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// OSC packet (address and arguments only, optionally transformed)
    #[default]
    Osc,
    /// JSON (human-readable, larger)
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max packet size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("osc") | None => NetworkFormat::Osc,
            Some("json") => NetworkFormat::Json,
            Some("bincode") => NetworkFormat::Bincode,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(65000);

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Sink that forwards deliveries over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
}

impl NetworkSink {
    /// Create a new NetworkSink
    #[instrument(name = "network_sink_new", skip(name, config))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let bind_addr = if config.addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(
            sink = %name,
            target = %config.addr,
            format = ?config.format,
            "NetworkSink connected"
        );

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, RelayError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| RelayError::config_validation("sink.params", e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| RelayError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    fn serialize(&self, delivery: &Delivery) -> Result<Vec<u8>, String> {
        match self.config.format {
            NetworkFormat::Osc => Ok(ingestion::codec::encode_message(&delivery.message).to_vec()),
            NetworkFormat::Json => serde_json::to_vec(&DeliveryRecord::from(delivery))
                .map_err(|e| format!("json error: {}", e)),
            NetworkFormat::Bincode => bincode::serialize(&DeliveryRecord::from(delivery))
                .map_err(|e| format!("bincode error: {}", e)),
        }
    }

    fn socket(&self) -> Result<&UdpSocket, RelayError> {
        self.socket
            .as_ref()
            .ok_or_else(|| RelayError::sink_delivery(&*self.name, "socket not connected"))
    }

    fn prepare_payload(&self, delivery: &Delivery) -> Result<Vec<u8>, RelayError> {
        let data = self
            .serialize(delivery)
            .map_err(|e| RelayError::sink_delivery(delivery.destination.as_str(), e))?;

        if data.len() > self.config.max_packet_size {
            return Err(RelayError::sink_delivery(
                delivery.destination.as_str(),
                format!(
                    "payload of {} bytes exceeds max_packet_size {}",
                    data.len(),
                    self.config.max_packet_size
                ),
            ));
        }

        Ok(data)
    }

    async fn transmit(&self, socket: &UdpSocket, data: &[u8], sequence: u64) {
        match socket.send(data).await {
            Ok(sent) => {
                debug!(sink = %self.name, sequence, bytes = sent, "Sent");
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                // ICMP port unreachable from a previous send; nobody listening yet
                warn!(sink = %self.name, target = %self.config.addr, "UDP target refused");
            }
            Err(e) => {
                // Log but don't fail - UDP is best-effort
                error!(sink = %self.name, error = %e, "UDP send failed");
            }
        }
    }
}

impl EventSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, delivery),
        fields(sink = %self.name, sequence = delivery.sequence)
    )]
    async fn write(&mut self, delivery: &Delivery) -> Result<(), RelayError> {
        let socket = self.socket()?;
        let data = self.prepare_payload(delivery)?;
        self.transmit(socket, &data, delivery.sequence).await;
        Ok(())
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), RelayError> {
        // UDP doesn't buffer
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), RelayError> {
        self.socket = None;
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}
