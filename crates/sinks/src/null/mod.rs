//! Null Output - counts and discards
//!
//! Useful for measuring input and codec throughput without destination I/O,
//! and for validating routing in a new configuration.
//!
//! ```toml
//! [discard]
//! type = "NullOutput"
//! tag = "app"
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use conduit_plugin::{Output, OutputRunner, PluginCommonConfig};

use crate::common::{SinkMetrics, SinkMetricsHandle};

/// Output that releases every record it receives
#[derive(Default)]
pub struct NullOutput {
    metrics: Arc<SinkMetrics>,
}

impl NullOutput {
    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SinkMetricsHandle {
        SinkMetricsHandle::new(Arc::clone(&self.metrics))
    }
}

#[async_trait]
impl Output for NullOutput {
    async fn init(&mut self, _common: &PluginCommonConfig, _settings: &toml::Table) -> conduit_plugin::Result<()> {
        Ok(())
    }

    async fn run(&mut self, mut runner: OutputRunner) -> conduit_plugin::Result<()> {
        while let Some(envelope) = runner.next_processed().await {
            let len = envelope.with_message(|m| m.raw().len());
            envelope.recycle();
            self.metrics.record_received();
            self.metrics.record_written(len as u64);
        }

        tracing::debug!(
            output = %runner.name(),
            records = self.metrics.snapshot().records_received,
            "null output stopped"
        );
        Ok(())
    }
}
