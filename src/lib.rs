// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod explain;
pub mod history;
pub mod ideas;
pub mod llm;
pub mod metrics;
pub mod momentum;
pub mod narrative;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod signal;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cluster::{Cluster, SignalClusterer};
pub use crate::config::PipelineConfig;
pub use crate::error::{ConfigError, RunError};
pub use crate::momentum::{MomentumDetector, MomentumSummary};
pub use crate::narrative::{BuildIdea, Narrative, NarrativeDetector};
pub use crate::normalize::{NormalizationMethod, Normalizer};
pub use crate::pipeline::{Pipeline, PipelineReport, RunContext, RunStage};
pub use crate::signal::{Signal, SourceType, Trend};

use anyhow::Context;
use axum::Router;
use tracing_subscriber::EnvFilter;

/// Full HTTP app: API routes plus `/metrics`, built from the resolved config.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = config::load_config_default()?;
    let state = AppState::new(cfg).context("invalid pipeline config")?;
    let metrics = metrics::Metrics::init()?;
    Ok(create_router(state).merge(metrics.router()))
}

pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Stderr logs filtered by `RUST_LOG` (default `info`): compact lines, or one
/// JSON object per event when `LOG_FORMAT=json`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let json = wants_json_logs(std::env::var(ENV_LOG_FORMAT).ok().as_deref());
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

fn wants_json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_selection() {
        assert!(wants_json_logs(Some("json")));
        assert!(wants_json_logs(Some(" JSON ")));
        assert!(!wants_json_logs(Some("compact")));
        assert!(!wants_json_logs(None));
    }
}
