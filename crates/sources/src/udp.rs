//! UDP Input - newline-separated records in datagrams
//!
//! Each datagram is split on `\n`; every trimmed, non-empty line becomes
//! one envelope. Datagrams larger than `max_packet_size` are truncated by
//! the kernel and counted as malformed.
//!
//! The socket is created with socket2 so the receive buffer can be sized
//! for bursts, then handed to tokio.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_plugin::{Input, InputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::common::{SourceMetrics, SourceMetricsHandle, non_empty_lines};
use crate::SourceError;

/// Default listen address
const DEFAULT_ADDRESS: &str = "127.0.0.1:5566";

/// Default maximum datagram size
const DEFAULT_MAX_PACKET_SIZE: usize = 4096;

/// Default socket receive buffer (256KB)
const DEFAULT_RECV_BUFFER_SIZE: usize = 256 * 1024;

/// UDP input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdpInputConfig {
    /// Listen address
    pub address: String,

    /// Largest datagram read in one piece
    pub max_packet_size: usize,

    /// SO_RCVBUF size (0 keeps the OS default)
    pub recv_buffer_size: usize,
}

impl Default for UdpInputConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

/// Datagram listener
#[derive(Default)]
pub struct UdpInput {
    config: UdpInputConfig,
    socket: Option<UdpSocket>,
    metrics: Arc<SourceMetrics>,
}

impl UdpInput {
    /// Address the socket is bound to, once initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SourceMetricsHandle {
        SourceMetricsHandle::new(Arc::clone(&self.metrics))
    }

    fn bind(&self) -> Result<UdpSocket, SourceError> {
        let address = &self.config.address;
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| SourceError::invalid("address", format!("'{address}': {e}")))?;
        create_socket(addr, self.config.recv_buffer_size).map_err(|e| SourceError::bind(address, e))
    }
}

/// Create a bound, non-blocking UDP socket with a sized receive buffer
fn create_socket(addr: SocketAddr, recv_buffer_size: usize) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    if recv_buffer_size > 0
        && let Err(e) = socket.set_recv_buffer_size(recv_buffer_size)
    {
        tracing::warn!(error = %e, requested_size = recv_buffer_size, "failed to set UDP SO_RCVBUF");
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

#[async_trait]
impl Input for UdpInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        if self.config.max_packet_size == 0 {
            return Err(SourceError::invalid("max_packet_size", "must be greater than 0")
                .into_plugin(&common.name));
        }

        let socket = self.bind().map_err(|e| e.into_plugin(&common.name))?;
        tracing::info!(input = %common.name, address = %self.config.address, "UDP input listening");
        self.socket = Some(socket);
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> conduit_plugin::Result<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| PluginError::init(runner.name(), "socket not initialized"))?;

        // One spare byte detects datagrams the kernel had to truncate
        let mut recv_buf = vec![0u8; self.config.max_packet_size + 1];

        loop {
            let received = tokio::select! {
                _ = runner.cancelled() => break,
                received = socket.recv_from(&mut recv_buf) => received,
            };

            let (len, peer) = match received {
                Ok(received) => received,
                Err(e) => {
                    self.metrics.error();
                    tracing::debug!(input = %runner.name(), error = %e, "UDP recv error");
                    continue;
                }
            };

            if len > self.config.max_packet_size {
                self.metrics.message_malformed();
                tracing::debug!(
                    peer = %peer,
                    max = self.config.max_packet_size,
                    "UDP packet too large, dropping"
                );
                continue;
            }

            for line in non_empty_lines(&recv_buf[..len]) {
                self.metrics.message_received(line.len() as u64);
                if let Err(e) = runner.emit(line).await {
                    return if e.is_shutdown() { Ok(()) } else { Err(e) };
                }
            }
        }

        let s = self.metrics.snapshot();
        tracing::info!(
            input = %runner.name(),
            messages_received = s.messages_received,
            messages_malformed = s.messages_malformed,
            "UDP input stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
