// src/pipeline.rs
//! Run orchestration: normalize → momentum → cluster → narratives.
//!
//! A `Pipeline` is built once from a validated config and can be run any
//! number of times. Each run gets its own `RunContext`, owned by the caller,
//! which records the stage progression; nothing is registered process-wide.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::SignalClusterer;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, RunError};
use crate::momentum::{MomentumDetector, MomentumSummary};
use crate::narrative::{Narrative, NarrativeDetector};
use crate::normalize::Normalizer;
use crate::signal::{Signal, SourceType};
use crate::sources::{collect_sources, CollectionWindow, SignalSource};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!(
            "pipeline_failed_runs_total",
            "Runs aborted because no source produced data."
        );
        describe_counter!("pipeline_signals_total", "Signals fed into pipeline runs.");
        describe_counter!(
            "pipeline_momentum_signals_total",
            "Signals flagged with momentum."
        );
        describe_counter!("pipeline_clusters_total", "Clusters formed.");
        describe_counter!("pipeline_narratives_total", "Narratives emitted.");
        describe_histogram!("pipeline_run_ms", "Wall time of one scoring run.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last completed run.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Pending,
    Collecting,
    Normalizing,
    DetectingMomentum,
    Clustering,
    DetectingNarratives,
    Completed,
    Failed,
}

impl RunStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Completed | RunStage::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: RunStage,
    pub at: DateTime<Utc>,
}

/// Per-run bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stage: RunStage,
    pub history: Vec<StageEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            stage: RunStage::Pending,
            history: vec![StageEntry {
                stage: RunStage::Pending,
                at: now,
            }],
            error: None,
        }
    }

    pub fn advance(&mut self, stage: RunStage) {
        tracing::debug!(target: "pipeline", run_id = %self.run_id, from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
        self.history.push(StageEntry {
            stage,
            at: Utc::now(),
        });
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(target: "pipeline", run_id = %self.run_id, stage = ?self.stage, %reason, "run failed");
        self.error = Some(reason);
        self.advance(RunStage::Failed);
    }

    /// Stages passed through, in order.
    pub fn stages(&self) -> Vec<RunStage> {
        self.history.iter().map(|e| e.stage).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_signals: usize,
    pub momentum_signals: usize,
    pub clusters: usize,
    pub narratives: usize,
    /// Distinct source types present in the input batch.
    pub source_types: Vec<SourceType>,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub window_days: u32,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub stats: PipelineStats,
    pub momentum: MomentumSummary,
    pub narratives: Vec<Narrative>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    momentum: MomentumDetector,
    clusterer: SignalClusterer,
    detector: NarrativeDetector,
}

impl Pipeline {
    /// Validate the config and build the four stages.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let method = config.validate()?;
        Ok(Self {
            normalizer: Normalizer::new(method),
            momentum: MomentumDetector::new(
                config.signals.momentum_threshold_pct,
                config.window.duration_days,
            ),
            clusterer: SignalClusterer::new(
                config.clustering.min_cluster_size,
                config.clustering.max_clusters,
            ),
            detector: NarrativeDetector::new(
                config.narratives.min_signal_types,
                config.narratives.min_momentum_score,
                config.narratives.max_narratives,
            ),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn window(&self) -> CollectionWindow {
        CollectionWindow::ending_now(self.config.window.duration_days)
    }

    /// Score one batch. Never fails: an empty narrative list is a valid result.
    pub fn run(&self, mut signals: Vec<Signal>, ctx: &mut RunContext) -> PipelineReport {
        ensure_metrics_described();
        let t0 = std::time::Instant::now();
        tracing::info!(target: "pipeline", run_id = %ctx.run_id, signals = signals.len(), "run started");

        let mut source_types: Vec<SourceType> = Vec::new();
        for s in &signals {
            if !source_types.contains(&s.source_type) {
                source_types.push(s.source_type.clone());
            }
        }

        ctx.advance(RunStage::Normalizing);
        self.normalizer.normalize(&mut signals);

        ctx.advance(RunStage::DetectingMomentum);
        let momentum_signals = self.momentum.detect(&mut signals);
        let momentum = MomentumDetector::aggregate(&signals, None);

        ctx.advance(RunStage::Clustering);
        let clusters = self.clusterer.cluster(&signals);
        let cluster_count = clusters.len();

        ctx.advance(RunStage::DetectingNarratives);
        let narratives = self.detector.detect(clusters);
        if narratives.is_empty() {
            tracing::info!(target: "pipeline", run_id = %ctx.run_id, "no cluster met the narrative criteria");
        }

        let generated_at = Utc::now();
        let (period_start, period_end) = period(&signals, generated_at, self.config.window.duration_days);
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;

        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_signals_total").increment(signals.len() as u64);
        counter!("pipeline_momentum_signals_total").increment(momentum_signals as u64);
        counter!("pipeline_clusters_total").increment(cluster_count as u64);
        counter!("pipeline_narratives_total").increment(narratives.len() as u64);
        histogram!("pipeline_run_ms").record(elapsed_ms);
        gauge!("pipeline_last_run_ts").set(generated_at.timestamp() as f64);

        ctx.advance(RunStage::Completed);
        tracing::info!(
            target: "pipeline",
            run_id = %ctx.run_id,
            momentum_signals,
            clusters = cluster_count,
            narratives = narratives.len(),
            elapsed_ms,
            "run completed"
        );

        PipelineReport {
            run_id: ctx.run_id,
            window_days: self.config.window.duration_days,
            generated_at,
            period_start,
            period_end,
            stats: PipelineStats {
                total_signals: signals.len(),
                momentum_signals,
                clusters: cluster_count,
                narratives: narratives.len(),
                source_types,
                elapsed_ms,
            },
            momentum,
            narratives,
        }
    }

    /// Collect from `sources` over the configured window, then `run`.
    pub async fn collect_and_run(
        &self,
        sources: &[SignalSource],
        ctx: &mut RunContext,
    ) -> Result<PipelineReport, RunError> {
        self.collect_and_run_in(sources, &self.window(), ctx).await
    }

    /// Fails the run only when there were sources and every one of them
    /// failed without a fallback feed.
    pub async fn collect_and_run_in(
        &self,
        sources: &[SignalSource],
        window: &CollectionWindow,
        ctx: &mut RunContext,
    ) -> Result<PipelineReport, RunError> {
        ctx.advance(RunStage::Collecting);
        let collected = collect_sources(sources, window).await;
        if !sources.is_empty() && collected.failed.len() == sources.len() {
            let err = RunError::AllSourcesFailed(collected.failed);
            ctx.fail(err.to_string());
            counter!("pipeline_failed_runs_total").increment(1);
            return Err(err);
        }
        Ok(self.run(collected.signals, ctx))
    }
}

/// Observed timestamp span, or the configured window ending now when the
/// batch is empty.
fn period(signals: &[Signal], now: DateTime<Utc>, days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = signals.iter().map(|s| s.timestamp).min();
    let end = signals.iter().map(|s| s.timestamp).max();
    match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => (now - Duration::days(i64::from(days)), now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockFeed;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, 0, 0, 0).unwrap()
    }

    /// Two source types sharing "ai_agents", each with a clean 100 -> 140 step.
    fn two_source_batch() -> Vec<Signal> {
        let mut out = Vec::new();
        for (st, metric) in [("onchain", "program_deployments"), ("social", "topic_mentions")] {
            for d in 1..=14u32 {
                let v = if d <= 7 { 100.0 } else { 140.0 };
                out.push(Signal::new(st, metric, v, day(d)).with_meta("category", "ai_agents"));
            }
        }
        out
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut cfg = PipelineConfig::default();
        cfg.signals.normalization_method = "median".into();
        assert!(matches!(
            Pipeline::new(cfg),
            Err(ConfigError::UnknownNormalizationMethod(_))
        ));
    }

    #[test]
    fn run_walks_every_stage_and_reports() {
        let p = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut ctx = RunContext::new();
        let report = p.run(two_source_batch(), &mut ctx);

        assert_eq!(
            ctx.stages(),
            vec![
                RunStage::Pending,
                RunStage::Normalizing,
                RunStage::DetectingMomentum,
                RunStage::Clustering,
                RunStage::DetectingNarratives,
                RunStage::Completed,
            ]
        );
        assert_eq!(report.run_id, ctx.run_id);
        assert_eq!(report.stats.total_signals, 28);
        assert_eq!(report.stats.momentum_signals, 28);
        assert_eq!(report.stats.clusters, 1);
        assert_eq!(report.narratives.len(), 1);
        assert_eq!(report.period_start, day(1));
        assert_eq!(report.period_end, day(14));

        let n = &report.narratives[0];
        assert_eq!(n.name, "ai_agents");
        assert!((n.momentum_score - 40.0).abs() < 1e-9);
        // diversity 2/3, momentum 0.4, size capped at 1.0
        let expected_cluster = (2.0 / 3.0 * 0.4 + 0.4 * 0.4 + 0.2) * 100.0;
        assert!((n.cluster_score - expected_cluster).abs() < 1e-9);
        assert!((n.strength_score - (48.0 + expected_cluster * 0.4)).abs() < 1e-9);
        assert!((report.momentum.momentum_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_completes_with_no_narratives() {
        let p = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut ctx = RunContext::new();
        let report = p.run(Vec::new(), &mut ctx);
        assert!(report.narratives.is_empty());
        assert_eq!(report.stats, PipelineStats {
            elapsed_ms: report.stats.elapsed_ms,
            ..PipelineStats::default()
        });
        assert_eq!(ctx.stage, RunStage::Completed);
        assert_eq!(report.period_end - report.period_start, Duration::days(14));
    }

    struct Down(&'static str);

    #[async_trait::async_trait]
    impl crate::sources::SignalProvider for Down {
        async fn collect(&self, _w: &CollectionWindow) -> anyhow::Result<Vec<Signal>> {
            anyhow::bail!("connection refused")
        }
        fn name(&self) -> &'static str {
            self.0
        }
        fn source_type(&self) -> SourceType {
            SourceType::Onchain
        }
    }

    #[tokio::test]
    async fn run_fails_when_no_source_delivers() {
        let p = Pipeline::new(PipelineConfig::default()).unwrap();
        let sources = vec![
            SignalSource::Live(Box::new(Down("a"))),
            SignalSource::Live(Box::new(Down("b"))),
        ];
        let mut ctx = RunContext::new();
        let err = p
            .collect_and_run_in(&sources, &CollectionWindow::new(day(15), 14), &mut ctx)
            .await
            .unwrap_err();

        assert_eq!(err, RunError::AllSourcesFailed(vec!["a", "b"]));
        assert_eq!(ctx.stage, RunStage::Failed);
        assert!(ctx.stage.is_terminal());
        assert_eq!(
            ctx.stages(),
            vec![RunStage::Pending, RunStage::Collecting, RunStage::Failed]
        );
        assert_eq!(
            ctx.error.as_deref(),
            Some("every source failed without a fallback: a, b")
        );
    }

    #[tokio::test]
    async fn one_surviving_source_keeps_the_run_alive() {
        let p = Pipeline::new(PipelineConfig::default()).unwrap();
        let sources = vec![
            SignalSource::Live(Box::new(Down("a"))),
            SignalSource::Mock(MockFeed::Social),
        ];
        let mut ctx = RunContext::new();
        let report = p
            .collect_and_run_in(&sources, &CollectionWindow::new(day(15), 14), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.stage, RunStage::Completed);
        assert!(report.stats.total_signals > 0);

        let mut ctx = RunContext::new();
        let empty = p.collect_and_run(&[], &mut ctx).await.unwrap();
        assert_eq!(empty.stats.total_signals, 0);
        assert_eq!(ctx.stage, RunStage::Completed);
    }

    #[tokio::test]
    async fn mock_sources_surface_the_ai_narrative() {
        let p = Pipeline::new(PipelineConfig::default()).unwrap();
        let sources = vec![
            SignalSource::Mock(MockFeed::Onchain),
            SignalSource::Mock(MockFeed::Development),
            SignalSource::Mock(MockFeed::Social),
        ];
        let w = CollectionWindow::new(day(15), 14);
        let mut ctx = RunContext::new();
        let report = p.collect_and_run_in(&sources, &w, &mut ctx).await.unwrap();

        assert_eq!(ctx.stages()[1], RunStage::Collecting);
        assert_eq!(report.stats.total_signals, 14 * 12);
        assert!(!report.narratives.is_empty());
        let top = &report.narratives[0];
        assert_eq!(top.source_types.len(), 3);
        assert!(top.keywords.iter().any(|k| k == "ai_agents"));
        for pair in report.narratives.windows(2) {
            assert!(pair[0].strength_score >= pair[1].strength_score);
        }
        for n in &report.narratives {
            assert!(n.strength_score <= 100.0);
            assert!(n.source_types.len() >= 2);
        }
    }
}
