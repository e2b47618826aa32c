// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::llm::LlmProvider;
use crate::normalize::NormalizationMethod;

pub const ENV_CONFIG_PATH: &str = "NARRATIVE_CONFIG_PATH";
pub const ENV_USE_MOCK: &str = "USE_MOCK_DATA";
pub const ENV_LLM_PROVIDER: &str = "LLM_PROVIDER";
pub const DEFAULT_CONFIG_TOML: &str = "config/narrative.toml";
pub const DEFAULT_CONFIG_JSON: &str = "config/narrative.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowCfg,
    pub signals: SignalsCfg,
    pub clustering: ClusteringCfg,
    pub narratives: NarrativesCfg,
    pub collection: CollectionCfg,
    pub llm: LlmCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowCfg {
    pub duration_days: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self { duration_days: 14 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsCfg {
    /// "minmax" | "zscore"; kept as text so a typo surfaces as a typed error.
    pub normalization_method: String,
    pub momentum_threshold_pct: f64,
}

impl Default for SignalsCfg {
    fn default() -> Self {
        Self {
            normalization_method: NormalizationMethod::MinMax.as_str().to_string(),
            momentum_threshold_pct: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringCfg {
    pub min_cluster_size: usize,
    pub max_clusters: usize,
}

impl Default for ClusteringCfg {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            max_clusters: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativesCfg {
    pub min_signal_types: usize,
    pub min_momentum_score: f64,
    pub max_narratives: usize,
}

impl Default for NarrativesCfg {
    fn default() -> Self {
        Self {
            min_signal_types: 2,
            min_momentum_score: 20.0,
            max_narratives: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionCfg {
    pub use_mock: bool,
    pub github_repo_limit: usize,
    pub github_repos: Vec<String>,
    pub social_sources: Vec<String>,
    /// Whole-request timeout for every live collector call.
    pub http_timeout_secs: u64,
}

impl Default for CollectionCfg {
    fn default() -> Self {
        Self {
            use_mock: true,
            github_repo_limit: 5,
            github_repos: [
                "solana-labs/solana",
                "coral-xyz/anchor",
                "project-serum/anchor",
                "raydium-io/raydium-clmm",
                "marinade-finance/liquid-staking-program",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            social_sources: [
                "https://solana.com/news/rss.xml",
                "https://www.helius.dev/blog/rss.xml",
                "https://www.coindesk.com/arc/outboundfeeds/rss/",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmCfg {
    /// "template" | "openai" | "local"
    pub provider: String,
    /// Overridden by `OPENAI_MODEL` / `LOCAL_LLM_MODEL`.
    pub model: Option<String>,
    /// Overridden by `OPENAI_BASE_URL` / `LOCAL_LLM_BASE_URL`.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub ideas_per_narrative: usize,
}

impl Default for LlmCfg {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Template.as_str().to_string(),
            model: None,
            base_url: None,
            timeout_secs: 60,
            ideas_per_narrative: 5,
        }
    }
}

impl PipelineConfig {
    /// Every misconfiguration check, run before any stage touches data.
    pub fn validate(&self) -> Result<NormalizationMethod, ConfigError> {
        let method: NormalizationMethod = self.signals.normalization_method.parse()?;

        let threshold = self.signals.momentum_threshold_pct;
        if !(threshold > 0.0) {
            return Err(ConfigError::non_positive("momentum_threshold_pct", threshold));
        }
        if self.window.duration_days == 0 {
            return Err(ConfigError::Zero {
                name: "window.duration_days",
            });
        }
        self.llm.provider.parse::<LlmProvider>()?;
        for (name, v) in [
            ("clustering.min_cluster_size", self.clustering.min_cluster_size),
            ("clustering.max_clusters", self.clustering.max_clusters),
            ("narratives.min_signal_types", self.narratives.min_signal_types),
            ("narratives.max_narratives", self.narratives.max_narratives),
            ("llm.ideas_per_narrative", self.llm.ideas_per_narrative),
            ("collection.http_timeout_secs", self.collection.http_timeout_secs as usize),
            ("llm.timeout_secs", self.llm.timeout_secs as usize),
        ] {
            if v == 0 {
                return Err(ConfigError::Zero { name });
            }
        }
        Ok(method)
    }

    /// Apply `$USE_MOCK_DATA` ("true"/"false", case-insensitive) and
    /// `$LLM_PROVIDER` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_LLM_PROVIDER) {
            if !v.trim().is_empty() {
                self.llm.provider = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var(ENV_USE_MOCK) {
            match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => self.collection.use_mock = true,
                "false" | "0" => self.collection.use_mock = false,
                other => tracing::warn!(value = other, "ignoring unparsable {ENV_USE_MOCK}"),
            }
        }
    }

    /// Repositories actually tracked, honouring the repo limit.
    pub fn tracked_repos(&self) -> Vec<String> {
        self.collection
            .github_repos
            .iter()
            .take(self.collection.github_repo_limit)
            .cloned()
            .collect()
    }
}

/// Load configuration from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing pipeline config {}", path.display()))
}

/// Load configuration using env var + fallbacks:
/// 1) $NARRATIVE_CONFIG_PATH
/// 2) config/narrative.toml
/// 3) config/narrative.json
/// 4) built-in defaults
///
/// `$USE_MOCK_DATA` and `$LLM_PROVIDER` are applied on top of whichever source won.
pub fn load_config_default() -> Result<PipelineConfig> {
    let mut cfg = resolve_config()?;
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn resolve_config() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_CONFIG_TOML);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_CONFIG_JSON);
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(PipelineConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON config");
    }
    match toml::from_str::<PipelineConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => serde_json::from_str(s)
            .map_err(|_| anyhow!(toml_err))
            .context("unsupported config format"),
    }
}
