// src/sources/mod.rs
//! Signal collectors. The scoring core never looks at which variant produced a
//! signal; it only receives the concatenated batch.

pub mod github;
pub mod mock;
pub mod rss;
pub mod solana_rpc;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::PipelineConfig;
use crate::signal::{Signal, SourceType};

pub use github::GithubProvider;
pub use mock::MockFeed;
pub use rss::RssMentionsProvider;
pub use solana_rpc::SolanaRpcProvider;

/// One-time metrics registration for collector series.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("source_signals_total", "Signals returned by collectors.");
        describe_counter!(
            "source_errors_total",
            "Collector failures (fetch/parse), fallback or not."
        );
        describe_histogram!("source_fetch_ms", "Live provider fetch+parse time.");
    });
}

/// HTTP client shared by the live providers. `timeout` bounds every request
/// end to end, so an upstream that stops answering surfaces as an error.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("narrative-radar/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
        .context("building collector http client")
}

/// Time span a batch is collected for: `days` whole days ending at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub end: DateTime<Utc>,
    pub days: u32,
}

impl CollectionWindow {
    pub fn new(end: DateTime<Utc>, days: u32) -> Self {
        Self { end, days }
    }

    pub fn ending_now(days: u32) -> Self {
        Self::new(Utc::now(), days)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.end - ChronoDuration::days(i64::from(self.days))
    }

    /// Midnight-aligned timestamps are not required; day `i` is `start + i days`.
    pub fn day(&self, i: u32) -> DateTime<Utc> {
        self.start() + ChronoDuration::days(i64::from(i))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start() && ts <= self.end
    }
}

/// A live data provider (network, API, crawler).
#[async_trait::async_trait]
pub trait SignalProvider: Send + Sync {
    async fn collect(&self, window: &CollectionWindow) -> Result<Vec<Signal>>;
    fn name(&self) -> &'static str;
    fn source_type(&self) -> SourceType;
    /// Mock feed to use when this provider fails.
    fn fallback(&self) -> Option<MockFeed> {
        None
    }
}

/// Where a batch of signals comes from.
pub enum SignalSource {
    Mock(MockFeed),
    Live(Box<dyn SignalProvider>),
}

impl SignalSource {
    pub fn name(&self) -> &'static str {
        match self {
            SignalSource::Mock(feed) => feed.name(),
            SignalSource::Live(p) => p.name(),
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            SignalSource::Mock(feed) => feed.source_type(),
            SignalSource::Live(p) => p.source_type(),
        }
    }

    pub async fn collect(&self, window: &CollectionWindow) -> Result<Vec<Signal>> {
        match self {
            SignalSource::Mock(feed) => Ok(feed.generate(window)),
            SignalSource::Live(p) => p.collect(window).await,
        }
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub signals: Vec<Signal>,
    /// Sources that failed and had no fallback feed, in source order.
    pub failed: Vec<&'static str>,
}

/// Collect from every source in order and concatenate. A failing source is
/// logged and counted; live sources with a fallback feed are replaced by it.
pub async fn collect_sources(sources: &[SignalSource], window: &CollectionWindow) -> Collected {
    ensure_metrics_described();

    let mut out = Collected::default();
    for src in sources {
        match src.collect(window).await {
            Ok(mut v) => {
                tracing::info!(target: "sources", source = src.name(), signals = v.len(), "collected");
                counter!("source_signals_total", "source" => src.name()).increment(v.len() as u64);
                out.signals.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "sources", error = ?e, source = src.name(), "source error");
                counter!("source_errors_total", "source" => src.name()).increment(1);
                let fallback = match src {
                    SignalSource::Live(p) => p.fallback(),
                    SignalSource::Mock(_) => None,
                };
                match fallback {
                    Some(feed) => {
                        tracing::warn!(
                            target: "sources",
                            source = src.name(),
                            fallback = feed.name(),
                            "falling back to mock feed"
                        );
                        out.signals.extend(feed.generate(window));
                    }
                    None => out.failed.push(src.name()),
                }
            }
        }
    }
    out
}

/// [`collect_sources`] without the failure list.
pub async fn collect_all(sources: &[SignalSource], window: &CollectionWindow) -> Vec<Signal> {
    collect_sources(sources, window).await.signals
}

/// Default source set for a configuration: the three mock feeds, or live
/// providers when `use_mock` is off. Each live provider needs its own
/// setting (`SOLANA_RPC_URL`, `GITHUB_TOKEN`, `social_sources`); a kind
/// without one stays mocked.
pub fn sources_from_config(cfg: &PipelineConfig) -> Vec<SignalSource> {
    if cfg.collection.use_mock {
        return vec![
            SignalSource::Mock(MockFeed::Onchain),
            SignalSource::Mock(MockFeed::Development),
            SignalSource::Mock(MockFeed::Social),
        ];
    }
    let timeout = Duration::from_secs(cfg.collection.http_timeout_secs);
    let env = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

    let onchain = match env(solana_rpc::ENV_SOLANA_RPC_URL) {
        Some(url) => SolanaRpcProvider::new(url, timeout).map(live),
        None => Err(anyhow::anyhow!("{} not set", solana_rpc::ENV_SOLANA_RPC_URL)),
    };
    let development = match env(github::ENV_GITHUB_TOKEN) {
        Some(token) => GithubProvider::new(cfg.tracked_repos(), token, timeout).map(live),
        None => Err(anyhow::anyhow!("{} not set", github::ENV_GITHUB_TOKEN)),
    };
    let social = if cfg.collection.social_sources.is_empty() {
        Err(anyhow::anyhow!("no social_sources configured"))
    } else {
        RssMentionsProvider::from_urls(cfg.collection.social_sources.clone(), timeout).map(live)
    };

    [
        (onchain, MockFeed::Onchain),
        (development, MockFeed::Development),
        (social, MockFeed::Social),
    ]
    .into_iter()
    .map(|(built, feed)| {
        built.unwrap_or_else(|e| {
            tracing::warn!(target: "sources", reason = %e, feed = feed.name(), "using mock feed");
            SignalSource::Mock(feed)
        })
    })
    .collect()
}

fn live<P: SignalProvider + 'static>(p: P) -> SignalSource {
    SignalSource::Live(Box::new(p))
}
