//! UDP Output - one datagram per record
//!
//! The socket is connected at init, so resolution and local bind errors fail
//! the output before the pipeline runs. Records larger than
//! `max_message_size` are dropped with a rate-limited warning.
//!
//! ```toml
//! [relay]
//! type = "UdpOutput"
//! tag = "app"
//! address = "10.0.0.5:5566"
//! max_message_size = 8192
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_plugin::{Output, OutputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;
use tokio::net::UdpSocket;

use crate::common::{SinkMetrics, SinkMetricsHandle};
use crate::util::RateLimitedLogger;
use crate::{Result, SinkError};

/// Largest UDP payload over IPv4
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65507;

/// Smallest accepted `max_message_size`
pub const MIN_MAX_MESSAGE_SIZE: usize = 512;

/// UDP output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UdpOutputConfig {
    /// Remote address
    pub address: String,

    /// Local address to send from (any port by default)
    pub local_address: Option<String>,

    /// Records above this size are dropped
    pub max_message_size: usize,
}

impl Default for UdpOutputConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            local_address: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Datagram sender
#[derive(Default)]
pub struct UdpOutput {
    config: UdpOutputConfig,
    socket: Option<UdpSocket>,
    metrics: Arc<SinkMetrics>,
}

impl UdpOutput {
    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SinkMetricsHandle {
        SinkMetricsHandle::new(Arc::clone(&self.metrics))
    }

    /// Local address of the connected socket, once initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    async fn connect(&self) -> Result<UdpSocket> {
        let address = &self.config.address;
        if address.is_empty() {
            return Err(SinkError::invalid("address", "must not be empty"));
        }

        let remote = tokio::net::lookup_host(address.as_str())
            .await
            .map_err(|e| SinkError::connect(address, e))?
            .next()
            .ok_or_else(|| SinkError::invalid("address", format!("'{address}' did not resolve")))?;

        let local = match &self.config.local_address {
            Some(local) => local.clone(),
            None if remote.is_ipv4() => "0.0.0.0:0".to_string(),
            None => "[::]:0".to_string(),
        };

        let socket = UdpSocket::bind(&local)
            .await
            .map_err(|e| SinkError::connect(&local, e))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| SinkError::connect(address, e))?;
        Ok(socket)
    }
}

#[async_trait]
impl Output for UdpOutput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        if self.config.max_message_size < MIN_MAX_MESSAGE_SIZE {
            return Err(SinkError::invalid(
                "max_message_size",
                format!("can't be smaller than {MIN_MAX_MESSAGE_SIZE} bytes"),
            )
            .into_plugin(&common.name));
        }

        let socket = self.connect().await.map_err(|e| e.into_plugin(&common.name))?;
        tracing::info!(
            output = %common.name,
            address = %self.config.address,
            max_message_size = self.config.max_message_size,
            "UDP output connected"
        );
        self.socket = Some(socket);
        Ok(())
    }

    async fn run(&mut self, mut runner: OutputRunner) -> conduit_plugin::Result<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| PluginError::init(runner.name(), "socket not connected"))?;
        let log = RateLimitedLogger::default();
        let max = self.config.max_message_size;

        while let Some(envelope) = runner.next_processed().await {
            self.metrics.record_received();
            let sent = envelope.with_message(|m| {
                let raw = m.raw();
                if raw.len() > max {
                    Err(raw.len())
                } else {
                    Ok(raw.to_vec())
                }
            });
            // Release before the send so the input can refill the slot
            drop(envelope);

            let datagram = match sent {
                Ok(datagram) => datagram,
                Err(size) => {
                    self.metrics.record_dropped();
                    log.warn(
                        runner.name(),
                        "record exceeds max_message_size, dropped",
                        &format!("{size} > {max}"),
                    );
                    continue;
                }
            };

            match socket.send(&datagram).await {
                Ok(n) => self.metrics.record_written(n as u64),
                Err(e) => {
                    self.metrics.write_error();
                    log.warn(runner.name(), "UDP send failed", &e);
                }
            }
        }

        let s = self.metrics.snapshot();
        tracing::info!(
            output = %runner.name(),
            records_written = s.records_written,
            records_dropped = s.records_dropped,
            "UDP output stopped"
        );
        Ok(())
    }
}
