//! HTTP Input - one record per POST body
//!
//! ```text
//! POST /<path>
//!
//! <record bytes>
//! ```
//!
//! Responses:
//! - `200 OK` once the record is submitted
//! - `400 Bad Request` for an empty body
//! - `503 Service Unavailable` while the pipeline shuts down
//!
//! Every response carries the configured `headers`:
//!
//! ```toml
//! [ingest]
//! type = "HttpListenInput"
//! address = "0.0.0.0:8325"
//! headers = { "Access-Control-Allow-Origin" = "*" }
//! ```
//!
//! The listener is bound at init; the server stops accepting on
//! cancellation and lets in-flight requests finish.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::routing::post;
use conduit_plugin::{Input, InputRunner, PluginCommonConfig, PluginError, decode_settings};
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::common::{SourceMetrics, SourceMetricsHandle};
use crate::SourceError;

/// Default listen address
const DEFAULT_ADDRESS: &str = "127.0.0.1:8325";

/// HTTP input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpListenInputConfig {
    /// Listen address
    pub address: String,

    /// Route accepting POST requests
    pub path: String,

    /// Headers added to every response
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpListenInputConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            path: "/".into(),
            headers: BTreeMap::new(),
        }
    }
}

/// HTTP POST listener
#[derive(Default)]
pub struct HttpListenInput {
    config: HttpListenInputConfig,
    headers: HeaderMap,
    listener: Option<TcpListener>,
    metrics: Arc<SourceMetrics>,
}

/// Shared state for the request handler
pub(crate) struct HttpState {
    pub(crate) runner: InputRunner,
    pub(crate) metrics: Arc<SourceMetrics>,
    pub(crate) headers: HeaderMap,
}

impl HttpListenInput {
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
impl Input for HttpListenInput {
    async fn init(&mut self, common: &PluginCommonConfig, settings: &toml::Table) -> conduit_plugin::Result<()> {
        self.config = decode_settings(&common.name, settings)?;
        if !self.config.path.starts_with('/') {
            return Err(SourceError::invalid("path", format!("'{}' must start with '/'", self.config.path))
                .into_plugin(&common.name));
        }

        self.headers = response_headers(&self.config.headers).map_err(|e| e.into_plugin(&common.name))?;

        let listener = TcpListener::bind(&self.config.address)
            .await
            .map_err(|e| SourceError::bind(&self.config.address, e).into_plugin(&common.name))?;

        tracing::info!(
            input = %common.name,
            address = %self.config.address,
            path = %self.config.path,
            headers = self.headers.len(),
            "HTTP input listening"
        );
        self.listener = Some(listener);
        Ok(())
    }

    async fn run(&mut self, runner: InputRunner) -> conduit_plugin::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| PluginError::init(runner.name(), "listener not initialized"))?;
        let name = runner.name().to_string();
        let cancel = runner.cancel_token().clone();

        let state = Arc::new(HttpState {
            runner,
            metrics: Arc::clone(&self.metrics),
            headers: self.headers.clone(),
        });
        let app = build_router(state, &self.config.path);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        let s = self.metrics.snapshot();
        tracing::info!(
            input = %name,
            messages_received = s.messages_received,
            "HTTP input stopped"
        );
        Ok(())
    }
}

/// Parse configured response headers
pub(crate) fn response_headers(configured: &BTreeMap<String, String>) -> crate::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(configured.len());
    for (name, value) in configured {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SourceError::invalid("headers", format!("'{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SourceError::invalid("headers", format!("'{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Build the axum router
pub(crate) fn build_router(state: Arc<HttpState>, path: &str) -> Router {
    Router::new().route(path, post(ingest)).with_state(state)
}

/// POST handler, adding the configured headers to the outcome
async fn ingest(State(state): State<Arc<HttpState>>, body: Bytes) -> (StatusCode, HeaderMap, &'static str) {
    let (status, text) = accept(&state, body).await;
    (status, state.headers.clone(), text)
}

/// The whole body is one record
async fn accept(state: &HttpState, body: Bytes) -> (StatusCode, &'static str) {
    if state.runner.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down");
    }
    if body.is_empty() {
        state.metrics.message_malformed();
        return (StatusCode::BAD_REQUEST, "empty body");
    }

    state.metrics.message_received(body.len() as u64);
    match state.runner.emit(&body).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) if e.is_shutdown() => (StatusCode::SERVICE_UNAVAILABLE, "shutting down"),
        Err(e) => {
            state.metrics.error();
            tracing::debug!(input = %state.runner.name(), error = %e, "HTTP record rejected");
            (StatusCode::INTERNAL_SERVER_ERROR, "record rejected")
        }
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
