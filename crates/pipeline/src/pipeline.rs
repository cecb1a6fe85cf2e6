//! Pipeline orchestrator
//!
//! Owns the lifecycle of one configured pipeline:
//!
//! ```text
//!   Loading ──→ Wiring ──→ Running ──→ Draining ──→ Stopped
//!   bucket      codecs,     spawn        stop inputs,
//!   sections    outputs,    tasks,       router and outputs
//!   by suffix   inputs,     wait for     empty their channels,
//!               router      control      abort on timeout
//! ```
//!
//! Draining is ordered. Inputs are cancelled first; once their senders are
//! gone the router forwards what is queued and exits, which closes the output
//! channels, and outputs finish their pending work. A stage that does not
//! finish within `shutdown_timeout` is cancelled and then aborted.
//!
//! Failures of individual plugins (init or run) go to one decision point,
//! `fail()`, which either logs and carries on (`isolate`) or stops the
//! pipeline (`fail_fast`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::{Config, ErrorPolicy, PluginCategory, PluginCommonConfig, PluginSection};
use conduit_plugin::{
    CodecTable, InputRunner, OutputRunner, PluginError, PluginRegistry, ReloadNotifier,
};
use conduit_protocol::{Envelope, EnvelopePool};
use conduit_routing::RouteTableBuilder;
use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::output_handle::OutputHandle;
use crate::router::{Router, RouterMetricsHandle};
use crate::{PipelineError, Result};

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Reading and bucketing configuration sections
    Loading,
    /// Building codecs, outputs, inputs and the router
    Wiring,
    /// All tasks started, waiting on control signals
    Running,
    /// Shutdown started, waiting for tasks
    Draining,
    /// Every task has finished or was aborted
    Stopped,
}

impl PipelineState {
    /// Lowercase label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Wiring => "wiring",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// External control of a running pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop (SIGINT / SIGTERM)
    Shutdown,
    /// Publish a reload notification (SIGHUP); wiring is not rebuilt
    Reload,
}

/// Sections bucketed by category, in wiring order
#[derive(Debug, Default)]
struct Loaded<'a> {
    decoders: Vec<&'a PluginSection>,
    encoders: Vec<&'a PluginSection>,
    filters: Vec<&'a PluginSection>,
    outputs: Vec<&'a PluginSection>,
    inputs: Vec<&'a PluginSection>,
}

/// Tasks and handles produced by wiring
struct Wired {
    inputs: JoinSet<conduit_plugin::Result<()>>,
    outputs: JoinSet<conduit_plugin::Result<()>>,
    names: HashMap<Id, (PluginCategory, String)>,
    router: JoinHandle<()>,
}

/// A configured pipeline, ready to run
pub struct Pipeline {
    config: Config,
    registry: Arc<PluginRegistry>,
    cancel: CancellationToken,
    stop: CancellationToken,
    reload: ReloadNotifier,
    state: watch::Sender<PipelineState>,
    router_metrics: Option<RouterMetricsHandle>,
}

impl Pipeline {
    /// Create a pipeline from configuration and a populated registry
    pub fn new(config: Config, registry: Arc<PluginRegistry>) -> Self {
        let (state, _) = watch::channel(PipelineState::Loading);
        Self {
            config,
            registry,
            cancel: CancellationToken::new(),
            stop: CancellationToken::new(),
            reload: ReloadNotifier::new(),
            state,
            router_metrics: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// The reload topic shared with every runner
    pub fn reload_notifier(&self) -> ReloadNotifier {
        self.reload.clone()
    }

    /// Token cancelled when draining starts, observed by inputs
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = previous.as_str(), to = next.as_str(), "pipeline state");
    }

    /// Apply the error policy to one plugin failure
    fn fail(&self, err: PipelineError) -> Result<()> {
        match self.config.global.on_plugin_error {
            ErrorPolicy::Isolate => {
                tracing::error!(error = %err.chain(), "plugin failed, isolating it");
                Ok(())
            }
            ErrorPolicy::FailFast => Err(err),
        }
    }

    /// Run until a `Shutdown` signal, the control channel closing, every input
    /// finishing, or a failure under `fail_fast`
    pub async fn run(mut self, mut control: mpsc::Receiver<ControlSignal>) -> Result<()> {
        let config = self.config.clone();
        let loaded = match load(&config) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.transition(PipelineState::Stopped);
                return Err(e);
            }
        };

        self.transition(PipelineState::Wiring);
        let wired = match self.wire(&loaded).await {
            Ok(wired) => wired,
            Err(e) => {
                self.cancel.cancel();
                self.stop.cancel();
                self.transition(PipelineState::Stopped);
                return Err(e);
            }
        };

        self.transition(PipelineState::Running);
        let metrics_task = self.spawn_metrics_reporter();
        tracing::info!(
            inputs = wired.inputs.len(),
            outputs = wired.outputs.len(),
            "pipeline running"
        );

        let Wired {
            mut inputs,
            mut outputs,
            names,
            router,
        } = wired;
        let outcome = self
            .supervise(&mut inputs, &mut outputs, &names, &mut control)
            .await;

        self.transition(PipelineState::Draining);
        self.cancel.cancel();
        let timeout = self.config.global.shutdown_timeout;
        drain_set("input", &mut inputs, &names, timeout, None).await;
        drain_router(router, timeout, &self.stop).await;
        drain_set("output", &mut outputs, &names, timeout, Some(&self.stop)).await;
        self.stop.cancel();
        if let Some(task) = metrics_task {
            task.abort();
        }

        if let Some(handle) = &self.router_metrics {
            let s = handle.snapshot();
            tracing::info!(
                envelopes_received = s.envelopes_received,
                envelopes_unmatched = s.envelopes_unmatched,
                "pipeline stopped"
            );
        }
        self.transition(PipelineState::Stopped);
        outcome
    }

    async fn wire(&mut self, loaded: &Loaded<'_>) -> Result<Wired> {
        let global = self.config.global.clone();

        // Codecs first: outputs and inputs reference them by name
        let mut codecs = CodecTable::new();
        for section in &loaded.decoders {
            match conduit_plugin::init_decoder(&self.registry, section) {
                Ok(decoder) => codecs.insert_decoder(section.name(), decoder),
                Err(e) => self.fail(PipelineError::plugin("decoder", section.name(), e))?,
            }
        }
        for section in &loaded.encoders {
            match conduit_plugin::init_encoder(&self.registry, section) {
                Ok(encoder) => codecs.insert_encoder(section.name(), encoder),
                Err(e) => self.fail(PipelineError::plugin("encoder", section.name(), e))?,
            }
        }
        for section in &loaded.filters {
            match conduit_plugin::init_filter(&self.registry, section) {
                Ok(filter) => codecs.insert_filter(section.name(), filter),
                Err(e) => self.fail(PipelineError::plugin("filter", section.name(), e))?,
            }
        }
        for section in loaded.inputs.iter().chain(loaded.outputs.iter()) {
            warn_missing_stages(section.common(), &codecs);
        }
        let codecs = Arc::new(codecs);

        let mut names = HashMap::new();

        // Outputs: one channel and route registration each
        let mut builder = RouteTableBuilder::new();
        let mut output_tasks = JoinSet::new();
        let mut handles = Vec::new();
        for section in &loaded.outputs {
            let common = section.common();
            let Some(tag) = common.tag.as_deref() else {
                tracing::warn!(output = %common.name, "output has no tag, skipping");
                continue;
            };

            let output = match conduit_plugin::init_output(&self.registry, section).await {
                Ok(output) => output,
                Err(e) => {
                    self.fail(PipelineError::plugin("output", section.name(), e))?;
                    continue;
                }
            };

            let id = builder.register_output(section.name())?;
            builder.subscribe(tag, id);
            let (tx, rx) = mpsc::channel::<Envelope>(global.plugin_chan_size);
            handles.push(OutputHandle::new(id, section.name(), tx));

            let runner = OutputRunner::new(
                Arc::new(common.clone()),
                rx,
                Arc::clone(&codecs),
                self.stop.clone(),
                self.reload.clone(),
            );
            let handle = output_tasks.spawn(conduit_plugin::run_output(output, runner));
            names.insert(handle.id(), (PluginCategory::Output, section.name().to_string()));
        }

        // Inputs: one private pool each, all sharing the router channel
        let (router_tx, router_rx) =
            crossfire::mpsc::bounded_async::<Envelope>(global.effective_router_chan_size());
        let mut input_tasks = JoinSet::new();
        for section in &loaded.inputs {
            let common = section.common();
            if common.tag.is_none() {
                tracing::warn!(input = %common.name, "input has no tag, its records will match no output");
            }

            let input = match conduit_plugin::init_input(&self.registry, section).await {
                Ok(input) => input,
                Err(e) => {
                    self.fail(PipelineError::plugin("input", section.name(), e))?;
                    continue;
                }
            };

            let pool = EnvelopePool::new(section.name(), global.pool_size)?;
            let runner = InputRunner::new(
                Arc::new(common.clone()),
                pool,
                router_tx.clone(),
                Arc::clone(&codecs),
                self.cancel.clone(),
                self.reload.clone(),
            );
            let handle = input_tasks.spawn(conduit_plugin::run_input(input, runner));
            names.insert(handle.id(), (PluginCategory::Input, section.name().to_string()));
        }
        // Router exits once every input has dropped its sender
        drop(router_tx);

        if input_tasks.is_empty() {
            output_tasks.abort_all();
            return Err(PipelineError::NoInputs);
        }

        let mut router = Router::new(builder.build());
        for handle in handles {
            router.register_output(handle);
        }
        self.router_metrics = Some(router.metrics_handle());
        let router = tokio::spawn(router.run(router_rx, self.stop.clone()));

        Ok(Wired {
            inputs: input_tasks,
            outputs: output_tasks,
            names,
            router,
        })
    }

    async fn supervise(
        &self,
        inputs: &mut JoinSet<conduit_plugin::Result<()>>,
        outputs: &mut JoinSet<conduit_plugin::Result<()>>,
        names: &HashMap<Id, (PluginCategory, String)>,
        control: &mut mpsc::Receiver<ControlSignal>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                signal = control.recv() => match signal {
                    Some(ControlSignal::Reload) => {
                        let receivers = self.reload.notify();
                        tracing::info!(subscribers = receivers, "reload notification published");
                    }
                    Some(ControlSignal::Shutdown) | None => {
                        tracing::info!("shutdown requested");
                        return Ok(());
                    }
                },
                Some(joined) = inputs.join_next_with_id() => {
                    if let Some(err) = task_failure(joined, names) {
                        self.fail(err)?;
                    }
                    if inputs.is_empty() {
                        tracing::info!("all inputs finished");
                        return Ok(());
                    }
                },
                Some(joined) = outputs.join_next_with_id() => {
                    if let Some(err) = task_failure(joined, names) {
                        self.fail(err)?;
                    }
                },
            }
        }
    }

    fn spawn_metrics_reporter(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.global.metrics_interval;
        if interval.is_zero() {
            return None;
        }
        let handle = self.router_metrics.clone()?;
        let cancel = self.stop.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            let mut previous = handle.snapshot();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let current = handle.snapshot();
                        let delta = current.diff(&previous);
                        tracing::info!(
                            received = delta.envelopes_received,
                            routed = delta.envelopes_routed,
                            unmatched = delta.envelopes_unmatched,
                            send_failures = delta.output_sends_failed,
                            bytes = delta.bytes_received,
                            "router metrics"
                        );
                        previous = current;
                    }
                }
            }
        }))
    }
}

/// Bucket sections by type suffix
///
/// Unrecognized suffixes are logged and skipped. Zero inputs is fatal.
fn load(config: &Config) -> Result<Loaded<'_>> {
    let mut loaded = Loaded::default();
    for section in config.plugins() {
        match section.category() {
            Some(PluginCategory::Input) => loaded.inputs.push(section),
            Some(PluginCategory::Output) => loaded.outputs.push(section),
            Some(PluginCategory::Decoder) => loaded.decoders.push(section),
            Some(PluginCategory::Encoder) => loaded.encoders.push(section),
            Some(PluginCategory::Filter) => loaded.filters.push(section),
            None => {
                tracing::warn!(
                    plugin = %section.name(),
                    type_name = %section.type_name(),
                    "unrecognized plugin type suffix, section ignored"
                );
            }
        }
    }

    if loaded.inputs.is_empty() {
        return Err(PipelineError::NoInputs);
    }
    Ok(loaded)
}

/// Check that every section names a registered type and that an input exists
///
/// Nothing is constructed or initialized.
pub fn validate(config: &Config, registry: &PluginRegistry) -> Result<()> {
    let loaded = load(config)?;
    let all = loaded
        .decoders
        .iter()
        .chain(&loaded.encoders)
        .chain(&loaded.filters)
        .chain(&loaded.outputs)
        .chain(&loaded.inputs);

    for section in all {
        let Some(category) = section.category() else {
            continue;
        };
        if !registry.contains(category, section.type_name()) {
            return Err(PipelineError::plugin(
                category.as_str(),
                section.name(),
                PluginError::TypeNotFound {
                    category,
                    type_name: section.type_name().to_string(),
                    available: registry.available_types(category).join(", "),
                },
            ));
        }
    }
    Ok(())
}

fn warn_missing_stages(common: &PluginCommonConfig, codecs: &CodecTable) {
    let missing = [
        ("decoder", common.decoder.as_deref().filter(|n| !codecs.has_decoder(n))),
        ("encoder", common.encoder.as_deref().filter(|n| !codecs.has_encoder(n))),
        ("filter", common.filter.as_deref().filter(|n| !codecs.has_filter(n))),
    ];
    for (stage, name) in missing {
        if let Some(name) = name {
            tracing::warn!(
                plugin = %common.name,
                stage,
                missing = %name,
                "referenced stage not available, records will pass through"
            );
        }
    }
}

/// Turn a finished plugin task into the failure it represents, if any
fn task_failure(
    joined: std::result::Result<(Id, conduit_plugin::Result<()>), tokio::task::JoinError>,
    names: &HashMap<Id, (PluginCategory, String)>,
) -> Option<PipelineError> {
    match joined {
        Ok((_, Ok(()))) => None,
        Ok((id, Err(e))) => {
            let (category, name) = names
                .get(&id)
                .map(|(c, n)| (c.as_str(), n.clone()))
                .unwrap_or(("plugin", "unknown".to_string()));
            Some(PipelineError::plugin(category, name, e))
        }
        Err(join_err) if join_err.is_cancelled() => None,
        Err(join_err) => {
            let name = names
                .get(&join_err.id())
                .map(|(_, n)| n.clone())
                .unwrap_or_else(|| "unknown".to_string());
            Some(PipelineError::Panicked { name })
        }
    }
}

async fn drain_set(
    kind: &'static str,
    set: &mut JoinSet<conduit_plugin::Result<()>>,
    names: &HashMap<Id, (PluginCategory, String)>,
    timeout: Duration,
    stop: Option<&CancellationToken>,
) {
    if join_all(kind, set, names, timeout).await {
        return;
    }

    if let Some(stop) = stop {
        tracing::warn!(kind, remaining = set.len(), "tasks did not finish within timeout, cancelling");
        stop.cancel();
        if join_all(kind, set, names, timeout).await {
            return;
        }
    }

    tracing::warn!(kind, remaining = set.len(), "tasks did not finish within timeout, aborting");
    set.abort_all();
    while set.join_next().await.is_some() {}
}

/// Join every task in `set`, returning false on timeout
async fn join_all(
    kind: &'static str,
    set: &mut JoinSet<conduit_plugin::Result<()>>,
    names: &HashMap<Id, (PluginCategory, String)>,
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, async {
        while let Some(joined) = set.join_next_with_id().await {
            if let Some(e) = task_failure(joined, names) {
                tracing::warn!(kind, error = %e.chain(), "plugin failed during shutdown");
            }
        }
    })
    .await
    .is_ok()
}

async fn drain_router(mut router: JoinHandle<()>, timeout: Duration, stop: &CancellationToken) {
    let outcome = match tokio::time::timeout(timeout, &mut router).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!("router did not drain within timeout, cancelling");
            stop.cancel();
            match tokio::time::timeout(timeout, &mut router).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("router did not stop, aborting");
                    router.abort();
                    return;
                }
            }
        }
    };
    if let Err(e) = outcome {
        tracing::warn!(error = %e, "router task panicked");
    }
}
