//! Stdout Output - one line per record
//!
//! Writes each processed record followed by `\n`. Handy with an encoder for
//! inspecting what a pipeline produces; not meant for high throughput.
//!
//! ```toml
//! [console]
//! type = "StdoutOutput"
//! tag = "app"
//! encoder = "as_json"
//! ```

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use conduit_plugin::{Output, OutputRunner, PluginCommonConfig};

use crate::common::{SinkMetrics, SinkMetricsHandle};
use crate::util::RateLimitedLogger;

/// Line writer for processed records
pub struct StdoutOutput {
    writer: Box<dyn Write + Send>,
    metrics: Arc<SinkMetrics>,
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl StdoutOutput {
    /// Write to something other than the process stdout
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SinkMetricsHandle {
        SinkMetricsHandle::new(Arc::clone(&self.metrics))
    }

    fn write_line(&mut self, raw: &[u8]) -> io::Result<()> {
        self.writer.write_all(raw)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[async_trait]
impl Output for StdoutOutput {
    async fn init(&mut self, _common: &PluginCommonConfig, _settings: &toml::Table) -> conduit_plugin::Result<()> {
        Ok(())
    }

    async fn run(&mut self, mut runner: OutputRunner) -> conduit_plugin::Result<()> {
        let log = RateLimitedLogger::default();

        while let Some(envelope) = runner.next_processed().await {
            self.metrics.record_received();
            let line = envelope.with_message(|m| m.raw().to_vec());
            drop(envelope);

            match self.write_line(&line) {
                Ok(()) => self.metrics.record_written(line.len() as u64 + 1),
                Err(e) => {
                    self.metrics.write_error();
                    log.warn(runner.name(), "stdout write failed", &e);
                }
            }
        }
        Ok(())
    }
}
