//! Tests for the pipeline orchestrator, wired with in-memory plugins

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduit_config::{Config, PluginCommonConfig};
use conduit_plugin::{
    Envelope, Filter, Input, InputRunner, Output, OutputRunner, PluginError, PluginRegistry,
    Result as PluginResult, async_trait, decode_settings,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::pipeline::{ControlSignal, Pipeline, PipelineState, validate};
use crate::PipelineError;

// =============================================================================
// Test plugins
// =============================================================================

type Sink = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default, Deserialize)]
struct LinesSettings {
    #[serde(default)]
    lines: Vec<String>,
    /// Keep running after the lines are emitted, until shutdown
    #[serde(default)]
    hold: bool,
}

/// Emits configured lines, then either returns or waits for shutdown
#[derive(Default)]
struct LinesInput {
    settings: LinesSettings,
}

#[async_trait]
impl Input for LinesInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> PluginResult<()> {
        self.settings = decode_settings(&common.name, settings)?;
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> PluginResult<()> {
        let mut reload = runner.subscribe_reload();
        for line in &self.settings.lines {
            runner.emit(line.as_bytes()).await?;
        }
        if !self.settings.hold {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = runner.cancelled() => return Ok(()),
                Ok(r) = reload.recv() => {
                    runner.emit(format!("reload {}", r.sequence).as_bytes()).await?;
                }
            }
        }
    }
}

/// Fails to initialize
struct BrokenInput;

#[async_trait]
impl Input for BrokenInput {
    async fn init(&mut self, common: &PluginCommonConfig, _settings: &toml::Table) -> PluginResult<()> {
        Err(PluginError::init(&common.name, "cannot open source"))
    }

    async fn run(&mut self, _runner: InputRunner) -> PluginResult<()> {
        Ok(())
    }
}

/// Starts, then exits with an error
struct CrashingInput;

#[async_trait]
impl Input for CrashingInput {
    async fn init(&mut self, _common: &PluginCommonConfig, _settings: &toml::Table) -> PluginResult<()> {
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> PluginResult<()> {
        Err(PluginError::init(runner.name(), "connection reset"))
    }
}

/// Collects processed records into a shared sink keyed by instance name
struct CollectOutput {
    sinks: Arc<Mutex<Vec<(String, Sink)>>>,
    sink: Sink,
}

#[async_trait]
impl Output for CollectOutput {
    async fn init(&mut self, common: &PluginCommonConfig, _settings: &toml::Table) -> PluginResult<()> {
        self.sinks
            .lock()
            .unwrap()
            .push((common.name.clone(), Arc::clone(&self.sink)));
        Ok(())
    }

    async fn run(&mut self, mut runner: OutputRunner) -> PluginResult<()> {
        while let Some(envelope) = runner.next_processed().await {
            let line = envelope.with_message(|m| String::from_utf8_lossy(m.raw()).into_owned());
            self.sink.lock().unwrap().push(line);
        }
        Ok(())
    }
}

struct UpperFilter;

impl Filter for UpperFilter {
    fn run(&self, envelope: Envelope) -> PluginResult<Envelope> {
        envelope.with_message_mut(|m| {
            let upper = m.raw().to_ascii_uppercase();
            m.set_raw(&upper);
        });
        Ok(envelope)
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    registry: Arc<PluginRegistry>,
    sinks: Arc<Mutex<Vec<(String, Sink)>>>,
}

impl Harness {
    fn new() -> Self {
        let sinks: Arc<Mutex<Vec<(String, Sink)>>> = Arc::default();
        let mut registry = PluginRegistry::new();
        registry.register_input("LinesInput", || Box::new(LinesInput::default()));
        registry.register_input("BrokenInput", || Box::new(BrokenInput));
        registry.register_input("CrashingInput", || Box::new(CrashingInput));
        registry.register_filter("UpperFilter", || Box::new(UpperFilter));

        let shared = Arc::clone(&sinks);
        registry.register_output("CollectOutput", move || {
            Box::new(CollectOutput {
                sinks: Arc::clone(&shared),
                sink: Sink::default(),
            })
        });

        Self {
            registry: Arc::new(registry),
            sinks,
        }
    }

    fn pipeline(&self, toml: &str) -> Pipeline {
        let config = Config::from_str(toml).unwrap();
        Pipeline::new(config, Arc::clone(&self.registry))
    }

    fn collected(&self, output: &str) -> Vec<String> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == output)
            .map(|(_, sink)| sink.lock().unwrap().clone())
            .unwrap_or_default()
    }

    async fn wait_for(&self, output: &str, count: usize) {
        timeout(Duration::from_secs(2), async {
            while self.collected(output).len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

const GLOBAL: &str = r#"
[global]
pool_size = 4
plugin_chan_size = 2
shutdown_timeout = "1s"
metrics_interval = "0s"
"#;

async fn run_to_completion(pipeline: Pipeline) -> crate::Result<()> {
    let (_control_tx, control_rx) = mpsc::channel(1);
    timeout(Duration::from_secs(5), pipeline.run(control_rx))
        .await
        .unwrap()
}

// =============================================================================
// Routing through a wired pipeline
// =============================================================================

#[tokio::test]
async fn test_fan_out_to_subscribed_outputs() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[web_in]
type = "LinesInput"
tag = "web"
lines = ["a", "b", "c"]

[web_file]
type = "CollectOutput"
tag = "web"

[web_copy]
type = "CollectOutput"
tag = "web"

[db_out]
type = "CollectOutput"
tag = "db"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();

    assert_eq!(harness.collected("web_file"), ["a", "b", "c"]);
    assert_eq!(harness.collected("web_copy"), ["a", "b", "c"]);
    assert!(harness.collected("db_out").is_empty());
}

#[tokio::test]
async fn test_more_records_than_pool_capacity() {
    let harness = Harness::new();
    let lines: Vec<String> = (0..50).map(|i| format!("\"line {i}\"")).collect();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
lines = [{}]

[out]
type = "CollectOutput"
tag = "t"
"#,
        lines.join(", ")
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();

    let got = harness.collected("out");
    assert_eq!(got.len(), 50);
    assert_eq!(got[0], "line 0");
    assert_eq!(got[49], "line 49");
}

#[tokio::test]
async fn test_output_filter_applied() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[upper]
type = "UpperFilter"

[in]
type = "LinesInput"
tag = "t"
lines = ["hello"]

[out]
type = "CollectOutput"
tag = "t"
filter = "upper"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    assert_eq!(harness.collected("out"), ["HELLO"]);
}

#[tokio::test]
async fn test_missing_filter_passes_through() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
lines = ["hello"]

[out]
type = "CollectOutput"
tag = "t"
filter = "does_not_exist"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    assert_eq!(harness.collected("out"), ["hello"]);
}

#[tokio::test]
async fn test_output_without_tag_is_skipped() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
lines = ["x"]

[untagged]
type = "CollectOutput"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    // Never initialized, so never registered its sink
    assert!(harness.sinks.lock().unwrap().is_empty());
}

// =============================================================================
// Loading and wiring failures
// =============================================================================

#[tokio::test]
async fn test_no_inputs_is_fatal() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[out]
type = "CollectOutput"
tag = "t"
"#
    );

    let pipeline = harness.pipeline(&toml);
    let state = pipeline.subscribe_state();
    let err = run_to_completion(pipeline).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoInputs));
    assert_eq!(*state.borrow(), PipelineState::Stopped);
}

#[tokio::test]
async fn test_unrecognized_suffix_is_ignored() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[odd]
type = "Mystery"

[in]
type = "LinesInput"
tag = "t"
lines = ["x"]

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    assert_eq!(harness.collected("out"), ["x"]);
}

#[tokio::test]
async fn test_isolate_skips_broken_input() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[a_broken]
type = "BrokenInput"
tag = "t"

[b_good]
type = "LinesInput"
tag = "t"
lines = ["ok"]

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    assert_eq!(harness.collected("out"), ["ok"]);
}

#[tokio::test]
async fn test_isolate_with_every_input_broken_is_no_inputs() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[broken]
type = "BrokenInput"
tag = "t"
"#
    );

    let err = run_to_completion(harness.pipeline(&toml)).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoInputs));
}

#[tokio::test]
async fn test_isolate_skips_unknown_type() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[ghost]
type = "KafkaInput"
tag = "t"

[in]
type = "LinesInput"
tag = "t"
lines = ["x"]

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    run_to_completion(harness.pipeline(&toml)).await.unwrap();
    assert_eq!(harness.collected("out"), ["x"]);
}

#[tokio::test]
async fn test_fail_fast_stops_on_init_error() {
    let harness = Harness::new();
    let toml = r#"
[global]
on_plugin_error = "fail_fast"
metrics_interval = "0s"

[a_broken]
type = "BrokenInput"
tag = "t"

[b_good]
type = "LinesInput"
tag = "t"
lines = ["ok"]
"#;

    let err = run_to_completion(harness.pipeline(toml)).await.unwrap_err();
    match err {
        PipelineError::Plugin { category, name, .. } => {
            assert_eq!(category, "input");
            assert_eq!(name, "a_broken");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fail_fast_reports_unknown_type() {
    let harness = Harness::new();
    let toml = r#"
[global]
on_plugin_error = "fail_fast"

[in]
type = "LinesInput"
tag = "t"

[out]
type = "NowhereOutput"
tag = "t"
"#;

    let err = run_to_completion(harness.pipeline(toml)).await.unwrap_err();
    assert!(err.chain().contains("plugin type not found"));
    assert!(err.chain().contains("CollectOutput"));
}

#[tokio::test]
async fn test_fail_fast_stops_on_run_error() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
on_plugin_error = "fail_fast"

[crash]
type = "CrashingInput"
tag = "t"

[steady]
type = "LinesInput"
tag = "t"
hold = true
"#
    );

    let err = run_to_completion(harness.pipeline(&toml)).await.unwrap_err();
    assert!(err.chain().contains("connection reset"));
}

#[tokio::test]
async fn test_isolate_keeps_running_after_run_error() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[crash]
type = "CrashingInput"
tag = "t"

[steady]
type = "LinesInput"
tag = "t"
lines = ["still here"]
hold = true

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    let pipeline = harness.pipeline(&toml);
    let mut state = pipeline.subscribe_state();
    let (control_tx, control_rx) = mpsc::channel(1);
    let task = tokio::spawn(pipeline.run(control_rx));

    harness.wait_for("out", 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*state.borrow_and_update(), PipelineState::Running);

    control_tx.send(ControlSignal::Shutdown).await.unwrap();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
}

// =============================================================================
// Control signals
// =============================================================================

#[tokio::test]
async fn test_shutdown_signal_stops_running_pipeline() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
lines = ["first"]
hold = true

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    let pipeline = harness.pipeline(&toml);
    let state = pipeline.subscribe_state();
    let (control_tx, control_rx) = mpsc::channel(1);
    let task = tokio::spawn(pipeline.run(control_rx));

    harness.wait_for("out", 1).await;
    control_tx.send(ControlSignal::Shutdown).await.unwrap();

    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
    assert_eq!(*state.borrow(), PipelineState::Stopped);
    assert_eq!(harness.collected("out"), ["first"]);
}

#[tokio::test]
async fn test_control_channel_closed_stops_pipeline() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
hold = true
"#
    );

    let (control_tx, control_rx) = mpsc::channel(1);
    let task = tokio::spawn(harness.pipeline(&toml).run(control_rx));
    drop(control_tx);

    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_reload_reaches_plugins() {
    let harness = Harness::new();
    let toml = format!(
        r#"{GLOBAL}
[in]
type = "LinesInput"
tag = "t"
lines = ["ready"]
hold = true

[out]
type = "CollectOutput"
tag = "t"
"#
    );

    let (control_tx, control_rx) = mpsc::channel(1);
    let task = tokio::spawn(harness.pipeline(&toml).run(control_rx));

    harness.wait_for("out", 1).await;
    control_tx.send(ControlSignal::Reload).await.unwrap();
    harness.wait_for("out", 2).await;

    control_tx.send(ControlSignal::Shutdown).await.unwrap();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

    assert_eq!(harness.collected("out"), ["ready", "reload 1"]);
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn test_validate_accepts_known_types() {
    let harness = Harness::new();
    let config = Config::from_str(
        r#"
[in]
type = "LinesInput"
tag = "t"

[out]
type = "CollectOutput"
tag = "t"
"#,
    )
    .unwrap();

    validate(&config, &harness.registry).unwrap();
}

#[test]
fn test_validate_rejects_unknown_type() {
    let harness = Harness::new();
    let config = Config::from_str(
        r#"
[in]
type = "LinesInput"
tag = "t"

[dec]
type = "CsvDecoder"
"#,
    )
    .unwrap();

    let err = validate(&config, &harness.registry).unwrap_err();
    assert!(err.chain().contains("CsvDecoder"));
}

#[test]
fn test_validate_requires_input() {
    let harness = Harness::new();
    let config = Config::from_str("[out]\ntype = \"CollectOutput\"\ntag = \"t\"\n").unwrap();

    assert!(matches!(
        validate(&config, &harness.registry),
        Err(PipelineError::NoInputs)
    ));
}
