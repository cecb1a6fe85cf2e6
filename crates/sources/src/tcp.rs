//! TCP Input - line-delimited records over TCP
//!
//! # Protocol
//!
//! Plain text, one record per line:
//! ```text
//! <record bytes>\n
//! ```
//!
//! Each line is trimmed of surrounding whitespace; empty lines are skipped.
//! Lines longer than `max_line_length` are consumed and dropped.
//!
//! # Design
//!
//! - **Bind at init**: a port conflict fails the input before the pipeline runs
//! - **Per-connection tasks**: each connection reads in its own task and
//!   submits through the shared runner, so ordering holds per connection
//! - **Cancellation**: the accept loop and every read race the runner's token
//!
//! # Configuration
//!
//! ```toml
//! [app_tcp]
//! type = "TcpInput"
//! tag = "app"
//! address = "0.0.0.0:5565"
//! keep_alive = true
//! keep_alive_period = "60s"
//! ```

use std::net::SocketAddr;
#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_plugin::{Input, InputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;
#[cfg(unix)]
use socket2::{Socket, TcpKeepalive};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::common::{DEFAULT_MAX_LINE_LENGTH, SourceMetrics, SourceMetricsHandle, trim_line};
use crate::SourceError;

/// Default listen address
const DEFAULT_ADDRESS: &str = "127.0.0.1:5565";

/// Default keepalive idle time before the first probe
const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// Read buffer per connection
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// TCP input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpInputConfig {
    /// Listen address
    pub address: String,

    /// Enable TCP keepalive on accepted connections
    pub keep_alive: bool,

    /// Idle time before keepalive probes start
    #[serde(with = "humantime_serde")]
    pub keep_alive_period: Duration,

    /// Longest accepted line in bytes
    pub max_line_length: usize,

    /// Disable Nagle's algorithm on accepted connections
    pub nodelay: bool,
}

impl Default for TcpInputConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            keep_alive: false,
            keep_alive_period: DEFAULT_KEEPALIVE_PERIOD,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            nodelay: true,
        }
    }
}

/// Line-delimited TCP listener
#[derive(Default)]
pub struct TcpInput {
    config: TcpInputConfig,
    listener: Option<TcpListener>,
    metrics: Arc<SourceMetrics>,
}

impl TcpInput {
    /// Address the listener is bound to, once initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SourceMetricsHandle {
        SourceMetricsHandle::new(Arc::clone(&self.metrics))
    }
}

#[async_trait]
impl Input for TcpInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        if self.config.max_line_length == 0 {
            return Err(SourceError::invalid("max_line_length", "must be greater than 0")
                .into_plugin(&common.name));
        }

        let listener = TcpListener::bind(&self.config.address)
            .await
            .map_err(|e| SourceError::bind(&self.config.address, e).into_plugin(&common.name))?;

        tracing::info!(
            input = %common.name,
            address = %self.config.address,
            keep_alive = self.config.keep_alive,
            "TCP input listening"
        );
        self.listener = Some(listener);
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> conduit_plugin::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| PluginError::init(runner.name(), "listener not initialized"))?;
        let runner = Arc::new(runner);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = runner.cancelled() => break,
                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        self.metrics.connection_opened();
                        let handler = ConnectionHandler {
                            runner: Arc::clone(&runner),
                            config: self.config.clone(),
                            metrics: Arc::clone(&self.metrics),
                            peer,
                        };
                        connections.spawn(handler.handle(stream));
                    }
                    Err(e) => {
                        // Transient accept errors - log and continue
                        tracing::warn!(input = %runner.name(), error = %e, "accept error");
                        self.metrics.error();
                    }
                },
            }
        }

        // Connections observe the same token; wait for them to finish
        while connections.join_next().await.is_some() {}

        let s = self.metrics.snapshot();
        tracing::info!(
            input = %runner.name(),
            connections_total = s.connections_total,
            messages_received = s.messages_received,
            "TCP input stopped"
        );
        Ok(())
    }
}

/// One accepted connection
struct ConnectionHandler {
    runner: Arc<InputRunner>,
    config: TcpInputConfig,
    metrics: Arc<SourceMetrics>,
    peer: SocketAddr,
}

impl ConnectionHandler {
    async fn handle(self, stream: TcpStream) {
        configure_socket(&stream, &self.config);
        tracing::debug!(input = %self.runner.name(), peer = %self.peer, "connection opened");

        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
        let mut line_buf = Vec::with_capacity(1024);

        loop {
            let read = tokio::select! {
                _ = self.runner.cancelled() => break,
                read = read_bounded_line(&mut reader, &mut line_buf, self.config.max_line_length) => read,
            };

            match read {
                Ok(ReadLineResult::Line) => {
                    let line = trim_line(&line_buf);
                    if line.is_empty() {
                        continue;
                    }
                    self.metrics.message_received(line.len() as u64);
                    if self.runner.emit(line).await.is_err() {
                        break;
                    }
                }
                Ok(ReadLineResult::TooLong) => {
                    self.metrics.message_malformed();
                    tracing::debug!(
                        peer = %self.peer,
                        max = self.config.max_line_length,
                        "line too long, dropped"
                    );
                }
                Ok(ReadLineResult::Eof) => break,
                Err(e) => {
                    if !is_connection_reset(&e) {
                        self.metrics.error();
                        tracing::debug!(peer = %self.peer, error = %e, "TCP read error");
                    }
                    break;
                }
            }
        }

        self.metrics.connection_closed();
        tracing::debug!(input = %self.runner.name(), peer = %self.peer, "connection closed");
    }
}

/// Configure socket options not exposed by tokio
#[cfg(unix)]
fn configure_socket(stream: &TcpStream, config: &TcpInputConfig) {
    // Safety: the fd is borrowed; ownership stays with tokio (see forget below)
    let socket = unsafe { Socket::from_raw_fd(stream.as_raw_fd()) };

    if config.nodelay && socket.set_tcp_nodelay(true).is_err() {
        tracing::debug!("failed to set TCP_NODELAY");
    }

    if config.keep_alive {
        let keepalive = TcpKeepalive::new().with_time(config.keep_alive_period);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            tracing::debug!(error = %e, "failed to set TCP keepalive");
        }
    }

    // Don't let socket2 close the fd - tokio still owns it
    std::mem::forget(socket);
}

#[cfg(not(unix))]
fn configure_socket(stream: &TcpStream, config: &TcpInputConfig) {
    if config.nodelay && stream.set_nodelay(true).is_err() {
        tracing::debug!("failed to set TCP_NODELAY");
    }
}

// =============================================================================
// Bounded line reading
// =============================================================================

/// Result of reading a bounded line
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadLineResult {
    /// A line is in the buffer (newline included when present)
    Line,
    /// The line exceeded the limit and was consumed
    TooLong,
    /// End of stream
    Eof,
}

/// Read one line without letting the buffer grow past `max_size`
///
/// An oversized line is consumed up to and including its newline.
pub(crate) async fn read_bounded_line<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<ReadLineResult> {
    buf.clear();
    let mut seen = 0usize;
    let mut too_long = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if seen == 0 {
                return Ok(ReadLineResult::Eof);
            }
            break;
        }

        let (take, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if !too_long {
            if buf.len() + take <= max_size + usize::from(done) {
                buf.extend_from_slice(&available[..take]);
            } else {
                too_long = true;
                buf.clear();
            }
        }

        seen += take;
        reader.consume(take);
        if done {
            break;
        }
    }

    if too_long {
        return Ok(ReadLineResult::TooLong);
    }
    Ok(ReadLineResult::Line)
}

/// Check if error is a connection reset (expected when peers go away)
fn is_connection_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
#[path = "tcp_test.rs"]
mod tcp_test;
