//! OSC UDP inbound listener

use std::net::SocketAddr;

use contracts::ListenerConfig;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::codec::decode_packet;
use crate::error::{IngestionError, Result};
use crate::queue::InboundQueue;

/// Source label used for metrics of UDP-received messages
pub const UDP_SOURCE_ID: &str = "osc_udp";

/// UDP listener decoding OSC datagrams into the inbound queue
pub struct OscUdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_datagram_size: usize,
}

impl OscUdpListener {
    /// Bind the listener socket
    #[instrument(name = "listener_bind", skip(config), fields(addr = %config.bind_addr()))]
    pub async fn bind(config: &ListenerConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| IngestionError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "OSC listener bound");

        Ok(Self {
            socket,
            local_addr,
            max_datagram_size: config.max_datagram_size.max(16),
        })
    }

    /// Actual bound address (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the receive loop until `shutdown` flips to `true`
    ///
    /// Never awaits downstream capacity; the queue applies its drop policy.
    /// Malformed datagrams and transient receive errors are logged and skipped.
    pub async fn run(self, queue: InboundQueue, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.max_datagram_size];
        debug!(local_addr = %self.local_addr, "OSC receive loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => self.handle_datagram(&buf[..len], peer, &queue),
                        Err(e) => warn!(error = %e, "UDP receive failed"),
                    }
                }
            }
        }

        info!(local_addr = %self.local_addr, "OSC listener stopped");
    }

    /// Spawn the receive loop on the current runtime
    pub fn spawn(self, queue: InboundQueue, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(queue, shutdown))
    }

    fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr, queue: &InboundQueue) {
        match decode_packet(datagram) {
            Ok(messages) => {
                trace!(%peer, count = messages.len(), "datagram decoded");
                for message in messages {
                    queue.push(message, UDP_SOURCE_ID);
                }
            }
            Err(e) => {
                queue.record_malformed(UDP_SOURCE_ID);
                warn!(%peer, len = datagram.len(), error = %e, "Dropping malformed OSC datagram");
            }
        }
    }
}
