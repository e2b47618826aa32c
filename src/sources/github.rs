// src/sources/github.rs
//! Repository activity from the GitHub REST API.
//!
//! One `repo_activity` signal per tracked repo and window day. The API only
//! gives totals, so the daily series is flat per repo; momentum comes from
//! comparing runs, not from inside a single batch.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{http_client, CollectionWindow, MockFeed, SignalProvider};
use crate::signal::{Signal, SourceType};

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
const API_BASE: &str = "https://api.github.com";

/// Subset of `GET /repos/{owner}/{repo}` we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
}

/// Totals for one repository: commits inside the window, closed pull
/// requests and closed issues overall.
#[derive(Debug, Clone)]
pub struct RepoStats {
    pub info: RepoInfo,
    pub commits: u64,
    pub prs: u64,
    pub issues: u64,
}

pub struct GithubProvider {
    repos: Vec<String>,
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl GithubProvider {
    pub fn new(repos: Vec<String>, token: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            repos,
            token,
            api_base: API_BASE.to_string(),
            client: http_client(timeout)?,
        })
    }

    /// Point at a GitHub Enterprise host or a local stand-in.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("github GET {url}"))?
            .error_for_status()
            .with_context(|| format!("github status {url}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("github json {url}"))
    }

    /// Total item count of a list endpoint. Requests one item per page, so the
    /// `last` page number in the `Link` header is the total.
    async fn count(&self, url: &str) -> Result<u64> {
        let sep = if url.contains('?') { '&' } else { '?' };
        let url = format!("{url}{sep}per_page=1");
        let resp = self.get(&url).await?;
        let last = resp
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page);
        if let Some(n) = last {
            return Ok(n);
        }
        let items: Vec<serde_json::Value> = resp
            .json()
            .await
            .with_context(|| format!("github json {url}"))?;
        Ok(items.len() as u64)
    }

    async fn fetch_repo(&self, repo: &str, window: &CollectionWindow) -> Result<RepoStats> {
        let base = format!("{}/repos/{repo}", self.api_base);
        let info: RepoInfo = self.get_json(&base).await?;
        let commits = self
            .count(&format!(
                "{base}/commits?since={}&until={}",
                window.start().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                window.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ))
            .await?;
        let prs = self.count(&format!("{base}/pulls?state=closed")).await?;
        let issues = self.count(&format!("{base}/issues?state=closed")).await?;
        Ok(RepoStats {
            info,
            commits,
            prs,
            issues,
        })
    }
}

/// Page number of the `rel="last"` link, if any.
pub fn last_page(link: &str) -> Option<u64> {
    let part = link.split(',').find(|p| p.contains(r#"rel="last""#))?;
    let url = part.split('<').nth(1)?.split('>').next()?;
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

#[async_trait]
impl SignalProvider for GithubProvider {
    async fn collect(&self, window: &CollectionWindow) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let mut out = Vec::new();
        let mut failures = 0usize;

        for repo in &self.repos {
            match self.fetch_repo(repo, window).await {
                Ok(stats) => out.extend(repo_signals(&stats, window)),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(target: "sources", error = ?e, repo = %repo, provider = "github", "repo fetch failed");
                    counter!("source_errors_total", "source" => "github").increment(1);
                }
            }
        }

        if !self.repos.is_empty() && failures == self.repos.len() {
            anyhow::bail!("github: all {failures} repositories failed");
        }
        histogram!("source_fetch_ms", "source" => "github")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "github"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Development
    }

    fn fallback(&self) -> Option<MockFeed> {
        Some(MockFeed::Development)
    }
}

/// Name-based category guess; first matching family wins.
pub fn categorize_repo(repo: &str) -> &'static str {
    let name = repo.to_ascii_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| name.contains(w));

    if has(&["ai", "agent", "bot"]) {
        "ai_agents"
    } else if has(&["dex", "amm", "swap", "jupiter", "raydium"]) {
        "defi"
    } else if has(&["game", "gaming", "star-atlas"]) {
        "gaming"
    } else if has(&["anchor", "solana-labs"]) {
        "infrastructure"
    } else {
        "other"
    }
}

/// Spread totals over one signal per day:
/// `commits + prs / days + issues / days` (integer division).
pub fn repo_signals(stats: &RepoStats, window: &CollectionWindow) -> Vec<Signal> {
    let days = u64::from(window.days.max(1));
    let activity = stats.commits + stats.prs / days + stats.issues / days;
    let category = categorize_repo(&stats.info.full_name);

    (0..window.days)
        .map(|i| {
            Signal::new(SourceType::Development, "repo_activity", activity as f64, window.day(i))
                .with_meta("category", category)
                .with_meta("repo", stats.info.full_name.as_str())
                .with_meta("stars", stats.info.stargazers_count)
                .with_meta("forks", stats.info.forks_count)
                .with_meta("commits", stats.commits)
                .with_meta("prs", stats.prs)
                .with_meta("issues", stats.issues)
                .with_meta("source", "github_api")
        })
        .collect()
}
