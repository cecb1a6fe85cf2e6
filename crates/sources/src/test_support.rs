//! Helpers shared by input tests

use std::sync::Arc;
use std::time::Duration;

use conduit_plugin::{
    CodecTable, Envelope, EnvelopePool, InputRunner, PluginCommonConfig, ReloadNotifier,
};
use crossfire::AsyncRx;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub(crate) fn common(name: &str, tag: &str) -> PluginCommonConfig {
    PluginCommonConfig {
        name: name.into(),
        type_name: "TestInput".into(),
        tag: Some(tag.into()),
        ..Default::default()
    }
}

/// Runner wired to a test channel, with its receiving end and shutdown token
pub(crate) fn runner(name: &str, tag: &str) -> (InputRunner, AsyncRx<Envelope>, CancellationToken) {
    let pool = EnvelopePool::new(name, 16).unwrap();
    let (tx, rx) = crossfire::mpsc::bounded_async(16);
    let cancel = CancellationToken::new();
    let runner = InputRunner::new(
        Arc::new(common(name, tag)),
        pool,
        tx,
        Arc::new(CodecTable::new()),
        cancel.clone(),
        ReloadNotifier::new(),
    );
    (runner, rx, cancel)
}

/// Settings table from TOML text
pub(crate) fn settings(text: &str) -> toml::Table {
    text.parse().unwrap()
}

/// Receive the next record as a string, failing after one second
pub(crate) async fn next_line(rx: &AsyncRx<Envelope>) -> String {
    let env = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for record")
        .unwrap();
    env.with_message(|m| String::from_utf8_lossy(m.raw()).into_owned())
}

/// Assert that nothing arrives within a short window
pub(crate) async fn assert_quiet(rx: &AsyncRx<Envelope>) {
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}
