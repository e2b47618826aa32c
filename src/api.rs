// src/api.rs
//! HTTP surface: one-shot detection over posted signals, a collect-and-run
//! endpoint over the configured sources, and the recent run list.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, RunError};
use crate::explain::Enricher;
use crate::history::{RunHistory, RunSummary};
use crate::pipeline::{Pipeline, PipelineReport, RunContext};
use crate::signal::Signal;
use crate::sources::sources_from_config;

const HISTORY_CAP: usize = 500;
const DEFAULT_RUNS_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    enricher: Arc<Enricher>,
    history: Arc<RunHistory>,
}

impl AppState {
    /// Validates `config`; the service refuses to start on a bad one. The
    /// enricher follows the `[llm]` section.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let pipeline = Pipeline::new(config)?;
        let enricher = Enricher::from_config(&pipeline.config().llm);
        Ok(Self::with_enricher(pipeline, enricher))
    }

    pub fn with_enricher(pipeline: Pipeline, enricher: Enricher) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            enricher: Arc::new(enricher),
            history: Arc::new(RunHistory::with_capacity(HISTORY_CAP)),
        }
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/detect", post(detect))
        .route("/api/run", post(run))
        .route("/api/runs", get(runs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// 400 for a rejected configuration override, 502 when no source delivered.
pub enum ApiError {
    Config(ConfigError),
    Run(RunError),
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::Config(e)
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        ApiError::Run(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Config(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Run(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[derive(Deserialize)]
struct DetectReq {
    signals: Vec<Signal>,
    /// Replaces the service config for this request only.
    #[serde(default)]
    config: Option<PipelineConfig>,
    #[serde(default)]
    explain: bool,
}

async fn detect(
    State(state): State<AppState>,
    Json(body): Json<DetectReq>,
) -> Result<Json<PipelineReport>, ApiError> {
    let override_pipeline;
    let pipeline = match body.config {
        Some(cfg) => {
            override_pipeline = Pipeline::new(cfg)?;
            &override_pipeline
        }
        None => state.pipeline.as_ref(),
    };

    let mut ctx = RunContext::new();
    let mut report = pipeline.run(body.signals, &mut ctx);
    if body.explain {
        state.enricher.enrich(&mut report.narratives).await;
    }
    state.history.push(&report);
    Ok(Json(report))
}

async fn run(State(state): State<AppState>) -> Result<Json<PipelineReport>, ApiError> {
    let sources = sources_from_config(state.pipeline.config());
    let mut ctx = RunContext::new();
    let mut report = state.pipeline.collect_and_run(&sources, &mut ctx).await?;
    state.enricher.enrich(&mut report.narratives).await;
    state.history.push(&report);
    Ok(Json(report))
}

async fn runs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<RunSummary>> {
    let n = q
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RUNS_LIMIT);
    Json(state.history.snapshot_last_n(n))
}
