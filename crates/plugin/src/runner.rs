//! Runners - the execution context handed to a running input or output
//!
//! ```text
//!   InputRunner                         Router                OutputRunner
//!   ┌─────────────────────┐                                  ┌──────────────────────┐
//!   │ acquire() ← pool    │                                  │ recv() ← mpsc        │
//!   │ submit()  → router ─┼──→ crossfire ──→ tag lookup ──→──┼→ process():          │
//!   │ pipe_filter()       │                                  │  decode→filter→encode│
//!   └─────────────────────┘                                  └──────────────────────┘
//! ```
//!
//! Every wait (empty pool, full router channel, empty output channel) races
//! the pipeline's `CancellationToken`, so a plugin loop returns promptly once
//! shutdown starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conduit_config::PluginCommonConfig;
use conduit_protocol::{Envelope, EnvelopePool};
use crossfire::MAsyncTx;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::codec::CodecTable;
use crate::reload::{Reload, ReloadNotifier};
use crate::{PluginError, Result};

/// Per-runner counters
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    records: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time snapshot of runner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerMetricsSnapshot {
    /// Records submitted (input) or processed (output)
    pub records: u64,
    /// Records dropped by a failing stage
    pub errors: u64,
}

impl RunnerMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            records: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> RunnerMetricsSnapshot {
        RunnerMetricsSnapshot {
            records: self.records.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Context for a running input
pub struct InputRunner {
    common: Arc<PluginCommonConfig>,
    pool: EnvelopePool,
    router: MAsyncTx<Envelope>,
    codecs: Arc<CodecTable>,
    cancel: CancellationToken,
    reload: ReloadNotifier,
    metrics: Arc<RunnerMetrics>,
}

impl InputRunner {
    /// Bind an input to its private pool and the shared router channel
    pub fn new(
        common: Arc<PluginCommonConfig>,
        pool: EnvelopePool,
        router: MAsyncTx<Envelope>,
        codecs: Arc<CodecTable>,
        cancel: CancellationToken,
        reload: ReloadNotifier,
    ) -> Self {
        Self {
            common,
            pool,
            router,
            codecs,
            cancel,
            reload,
            metrics: Arc::new(RunnerMetrics::new()),
        }
    }

    /// Input instance name
    #[inline]
    pub fn name(&self) -> &str {
        &self.common.name
    }

    /// Tag stamped on every envelope this input emits
    #[inline]
    pub fn tag(&self) -> &str {
        self.common.tag_or_empty()
    }

    /// Common settings
    #[inline]
    pub fn common(&self) -> &PluginCommonConfig {
        &self.common
    }

    /// The input's private pool
    #[inline]
    pub fn pool(&self) -> &EnvelopePool {
        &self.pool
    }

    /// Shutdown token
    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check if shutdown has started
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for shutdown
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Subscribe to reload notifications
    pub fn subscribe_reload(&self) -> broadcast::Receiver<Reload> {
        self.reload.subscribe()
    }

    /// Metrics handle, valid after the runner is consumed
    pub fn metrics(&self) -> Arc<RunnerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Take a free envelope, waiting while the pool is drained
    ///
    /// Returns `None` once shutdown starts.
    pub async fn acquire(&self) -> Option<Envelope> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.pool.acquire() => match result {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    tracing::debug!(input = %self.common.name, error = %e, "pool closed");
                    None
                }
            },
        }
    }

    /// Hand a populated envelope to the router, waiting while its channel is full
    ///
    /// # Errors
    /// `PluginError::Shutdown` once shutdown starts or the router is gone. The
    /// envelope is released in that case.
    pub async fn submit(&self, envelope: Envelope) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PluginError::Shutdown),
            result = self.router.send(envelope) => {
                result.map_err(|_| PluginError::Shutdown)?;
                self.metrics.record();
                Ok(())
            }
        }
    }

    /// Run the input's configured filter, or pass through
    pub fn pipe_filter(&self, envelope: Envelope) -> Result<Envelope> {
        self.codecs
            .pipe_filter(self.common.filter.as_deref(), envelope)
    }

    /// Acquire, populate with `raw` and this input's tag, filter, and submit
    ///
    /// A record rejected by the filter is logged and dropped; that is not an
    /// error for the caller.
    ///
    /// # Errors
    /// `PluginError::Shutdown` once shutdown starts or the router is gone.
    pub async fn emit(&self, raw: &[u8]) -> Result<()> {
        let envelope = self.acquire().await.ok_or(PluginError::Shutdown)?;
        envelope.with_message_mut(|m| m.populate(raw, self.tag()));

        match self.pipe_filter(envelope) {
            Ok(envelope) => self.submit(envelope).await,
            Err(e) => {
                self.metrics.error();
                tracing::debug!(input = %self.common.name, error = %e, "record dropped by filter");
                Ok(())
            }
        }
    }
}

/// Context for a running output
///
/// Outputs subscribed to the same tag receive shares of one slot. An output
/// with a decoder, filter or encoder first copies a shared record into its
/// private one-slot pool, so its stages never touch what a sibling sees.
pub struct OutputRunner {
    common: Arc<PluginCommonConfig>,
    receiver: mpsc::Receiver<Envelope>,
    codecs: Arc<CodecTable>,
    cancel: CancellationToken,
    reload: ReloadNotifier,
    metrics: Arc<RunnerMetrics>,
    private: Option<EnvelopePool>,
}

impl OutputRunner {
    /// Bind an output to its inbound channel
    pub fn new(
        common: Arc<PluginCommonConfig>,
        receiver: mpsc::Receiver<Envelope>,
        codecs: Arc<CodecTable>,
        cancel: CancellationToken,
        reload: ReloadNotifier,
    ) -> Self {
        let has_stages = common.decoder.is_some() || common.filter.is_some() || common.encoder.is_some();
        // A one-slot pool cannot fail to build
        let private = has_stages
            .then(|| EnvelopePool::new(format!("{}.private", common.name), 1).ok())
            .flatten();

        Self {
            common,
            receiver,
            codecs,
            cancel,
            reload,
            metrics: Arc::new(RunnerMetrics::new()),
            private,
        }
    }

    /// Output instance name
    #[inline]
    pub fn name(&self) -> &str {
        &self.common.name
    }

    /// Tag this output is subscribed to
    #[inline]
    pub fn tag(&self) -> &str {
        self.common.tag_or_empty()
    }

    /// Common settings
    #[inline]
    pub fn common(&self) -> &PluginCommonConfig {
        &self.common
    }

    /// Shutdown token
    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Check if shutdown has started
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Subscribe to reload notifications
    pub fn subscribe_reload(&self) -> broadcast::Receiver<Reload> {
        self.reload.subscribe()
    }

    /// Metrics handle, valid after the runner is consumed
    pub fn metrics(&self) -> Arc<RunnerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Next addressed envelope
    ///
    /// Returns `None` once shutdown starts or the router has gone away.
    pub async fn recv(&mut self) -> Option<Envelope> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            envelope = self.receiver.recv() => envelope,
        }
    }

    /// Next addressed envelope without waiting
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.receiver.try_recv().ok()
    }

    /// Apply the configured decoder, filter and encoder in that order
    ///
    /// A record shared with other outputs is copied into the private slot
    /// first. A failing stage drops the envelope and returns its error.
    ///
    /// # Errors
    /// The failing stage's error, or `PluginError::Stage` when the record is
    /// shared and the private slot is still held by a previous record.
    pub fn process(&self, envelope: Envelope) -> Result<Envelope> {
        let envelope = match &self.private {
            Some(private) if envelope.ref_count() > 1 => match private.try_acquire() {
                Some(owned) => Self::copy_into(envelope, owned),
                None => {
                    self.metrics.error();
                    return Err(PluginError::stage(
                        "output",
                        self.common.name.clone(),
                        "private slot still held by a previous record",
                    ));
                }
            },
            _ => envelope,
        };
        self.run_stages(envelope)
    }

    fn copy_into(shared: Envelope, owned: Envelope) -> Envelope {
        shared.with_message(|src| owned.with_message_mut(|dst| dst.copy_from(src)));
        drop(shared);
        owned
    }

    /// Copy a shared record into the private slot, waiting for it to free up
    ///
    /// Returns `None` once shutdown starts.
    async fn exclusive(&self, envelope: Envelope) -> Option<Envelope> {
        let Some(private) = &self.private else {
            return Some(envelope);
        };
        if envelope.ref_count() <= 1 {
            return Some(envelope);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            owned = private.acquire() => owned.ok().map(|owned| Self::copy_into(envelope, owned)),
        }
    }

    fn run_stages(&self, envelope: Envelope) -> Result<Envelope> {
        let common = &self.common;
        let result = self
            .codecs
            .pipe_decode(common.decoder.as_deref(), envelope)
            .and_then(|env| self.codecs.pipe_filter(common.filter.as_deref(), env))
            .and_then(|env| self.codecs.pipe_encode(common.encoder.as_deref(), env));

        match &result {
            Ok(_) => self.metrics.record(),
            Err(_) => self.metrics.error(),
        }
        result
    }

    /// Receive the next envelope that makes it through `process()`
    ///
    /// Records rejected by a stage are logged at debug level and skipped.
    pub async fn next_processed(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.recv().await?;
            let envelope = self.exclusive(envelope).await?;
            match self.process(envelope) {
                Ok(envelope) => return Some(envelope),
                Err(e) => {
                    tracing::debug!(output = %self.common.name, error = %e, "record dropped");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
