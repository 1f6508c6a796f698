//! HTTP front end: serves the page and turns `POST /run` into a tool run.

pub mod page;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{Html, Json};
use axum::routing::{get, post};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{Instrument, Span, field, info, info_span, warn};

use crate::config::{ServerConfig, ToolLocation};
use crate::error::PlaygroundError;
use crate::runner::{ExecutionResult, Mode, Runner};
use crate::stager::Stager;

/// One submission, as posted by the page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionRequest {
    #[serde(rename = "src")]
    pub source: String,
    #[serde(default)]
    pub mode: Mode,
}

/// What the page gets back. `stdout` and `stderr` are all it needs; the rest
/// is for scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl From<ExecutionResult> for RunResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            exit_code: result.exit_code(),
            timed_out: result.timed_out(),
            stdout: result.stdout,
            stderr: result.stderr,
        }
    }
}

/// Read-only state shared by every request. Built once at startup.
pub struct AppState {
    runner: Runner,
    page: String,
    max_source_bytes: usize,
}

impl AppState {
    /// Resolve the tool, create the staging root and render the page.
    ///
    /// A missing tool is not fatal: the server starts and reports it on
    /// every run.
    pub async fn build(config: &ServerConfig) -> Result<Self> {
        let tool = ToolLocation::resolve(&config.tool);
        match &tool {
            ToolLocation::Ready(path) => info!(tool = %path.display(), "tool resolved"),
            ToolLocation::Unavailable { path, reason } => {
                warn!(tool = %path.display(), %reason, "tool unavailable; runs will fail")
            }
        }

        let stager = Stager::new(&config.staging_dir, &config.source_name);
        stager.prepare().await.with_context(|| {
            format!(
                "failed to create staging directory {}",
                config.staging_dir.display()
            )
        })?;

        Ok(Self {
            runner: Runner::new(tool, stager, config.runner.clone()),
            page: page::render(&config.example),
            max_source_bytes: config.max_source_bytes,
        })
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    fn body_limit(&self) -> usize {
        // JSON escaping can grow each source byte up to six.
        self.max_source_bytes.saturating_mul(6).saturating_add(1024)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.body_limit();
    Router::new()
        .route("/", get(index))
        .route("/run", post(run))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn health() -> &'static str {
    "ok"
}

async fn run(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RunResponse>, PlaygroundError> {
    let id: u32 = rand::rng().random();
    let span = info_span!("run", id = %format!("{id:08x}"), mode = field::Empty);

    async move {
        let result = handle_run(&state, &body).await;
        if let Err(e) = &result {
            warn!(error = %e, "run failed");
        }
        result.map(|result| Json(result.into()))
    }
    .instrument(span)
    .await
}

async fn handle_run(state: &AppState, body: &[u8]) -> Result<ExecutionResult, PlaygroundError> {
    let request: ExecutionRequest =
        serde_json::from_slice(body).map_err(|e| PlaygroundError::Decode(e.to_string()))?;
    Span::current().record("mode", field::debug(&request.mode));

    if request.source.len() > state.max_source_bytes {
        return Err(PlaygroundError::SourceTooLarge {
            len: request.source.len(),
            limit: state.max_source_bytes,
        });
    }

    state.runner.run_source(&request.source, request.mode).await
}
