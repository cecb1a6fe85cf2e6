//! Helpers shared by output tests

use std::sync::Arc;

use conduit_plugin::{
    CodecTable, Envelope, EnvelopePool, OutputRunner, PluginCommonConfig, ReloadNotifier,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) fn common(name: &str) -> PluginCommonConfig {
    PluginCommonConfig {
        name: name.into(),
        type_name: "TestOutput".into(),
        tag: Some("t".into()),
        ..Default::default()
    }
}

/// Settings table from TOML text
pub(crate) fn settings(text: &str) -> toml::Table {
    text.parse().unwrap()
}

/// Router stand-in feeding an output runner
pub(crate) struct Feed {
    pool: EnvelopePool,
    tx: Option<mpsc::Sender<Envelope>>,
}

impl Feed {
    /// Send one record
    pub(crate) async fn send(&self, record: &str) {
        let envelope = self.pool.acquire().await.unwrap();
        envelope.with_message_mut(|m| m.populate(record.as_bytes(), "t"));
        let tx = self.tx.as_ref().expect("feed already closed");
        tx.send(envelope).await.unwrap();
    }

    /// Drop the sender, as the router does when it drains
    pub(crate) fn close(&mut self) {
        self.tx = None;
    }

    /// Envelopes not yet recycled
    pub(crate) fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }
}

/// Runner with no codecs, its feed and its shutdown token
pub(crate) fn output_runner(name: &str) -> (OutputRunner, Feed, CancellationToken) {
    output_runner_with(common(name), CodecTable::new())
}

/// Runner with the given common settings and codec table
pub(crate) fn output_runner_with(
    common: PluginCommonConfig,
    codecs: CodecTable,
) -> (OutputRunner, Feed, CancellationToken) {
    let pool = EnvelopePool::new(&common.name, 64).unwrap();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let runner = OutputRunner::new(
        Arc::new(common),
        rx,
        Arc::new(codecs),
        cancel.clone(),
        ReloadNotifier::new(),
    );
    (runner, Feed { pool, tx: Some(tx) }, cancel)
}
