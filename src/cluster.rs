// src/cluster.rs
//! # Signal Clusterer
//! Groups momentum-carrying signals that share thematic keywords and scores each
//! group by source diversity, average momentum and size.
//!
//! Grouping is a single hop through an inverted keyword index: a seed signal
//! pulls in every signal that shares one of *its own* keywords. It is not a
//! transitive closure, and a signal already pulled into an earlier cluster can be
//! pulled into a later one again when it shares a keyword with that seed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::momentum::mean;
use crate::signal::{Signal, SourceType};

/// Expected maximum number of distinct source types in one cluster.
pub const EXPECTED_SOURCE_TYPES: f64 = 3.0;
/// Cluster size at which the size component saturates.
pub const CLUSTER_SIZE_CAP: f64 = 10.0;

pub const DIVERSITY_WEIGHT: f64 = 0.4;
pub const MOMENTUM_WEIGHT: f64 = 0.4;
pub const SIZE_WEIGHT: f64 = 0.2;

/// Metadata fields that contribute keywords, in extraction order.
pub const KEYWORD_FIELDS: [&str; 5] = ["category", "topic", "keywords", "topics", "tags"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub signals: Vec<Signal>,
    /// Union of member keywords, ordered by first appearance.
    pub keywords: Vec<String>,
    /// Distinct member source types, ordered by first appearance.
    pub source_types: Vec<SourceType>,
    pub avg_momentum: f64,
    pub diversity_score: f64,
    pub size_score: f64,
    pub cluster_score: f64,
    pub size: usize,
    pub has_multi_signal_reinforcement: bool,
}

impl Cluster {
    /// Build an enriched cluster from its members.
    pub fn from_members(cluster_id: impl Into<String>, signals: Vec<Signal>) -> Self {
        let mut keywords = Vec::new();
        let mut seen = HashSet::new();
        let mut source_types: Vec<SourceType> = Vec::new();
        for s in &signals {
            for kw in extract_keywords(s) {
                if seen.insert(kw.clone()) {
                    keywords.push(kw);
                }
            }
            if !source_types.contains(&s.source_type) {
                source_types.push(s.source_type.clone());
            }
        }

        let size = signals.len();
        let diversity_score = source_types.len() as f64 / EXPECTED_SOURCE_TYPES;
        let avg_momentum = mean(signals.iter().filter_map(|s| s.momentum_score));
        let size_score = (size as f64 / CLUSTER_SIZE_CAP).min(1.0);

        Self {
            cluster_id: cluster_id.into(),
            keywords,
            has_multi_signal_reinforcement: source_types.len() >= 2,
            source_types,
            avg_momentum,
            diversity_score,
            size_score,
            cluster_score: cluster_score(diversity_score, avg_momentum, size_score),
            size,
            signals,
        }
    }
}

/// Weighted blend of the three components, scaled to roughly 0..100.
pub fn cluster_score(diversity_score: f64, avg_momentum: f64, size_score: f64) -> f64 {
    (diversity_score * DIVERSITY_WEIGHT
        + (avg_momentum / 100.0) * MOMENTUM_WEIGHT
        + size_score * SIZE_WEIGHT)
        * 100.0
}

/// Keywords of one signal: singleton fields and string lists from
/// `KEYWORD_FIELDS`, deduplicated, in field order. Anything else is ignored.
pub fn extract_keywords(signal: &Signal) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !s.is_empty() && !out.iter().any(|k| k == s) {
            out.push(s.to_string());
        }
    };
    for field in KEYWORD_FIELDS {
        match signal.metadata.get(field) {
            Some(Value::String(s)) => push(s.as_str()),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).for_each(&mut push),
            _ => {}
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct SignalClusterer {
    min_cluster_size: usize,
    max_clusters: usize,
}

impl SignalClusterer {
    pub fn new(min_cluster_size: usize, max_clusters: usize) -> Self {
        Self {
            min_cluster_size,
            max_clusters,
        }
    }

    /// Cluster momentum signals, strongest first, at most `max_clusters`.
    pub fn cluster(&self, signals: &[Signal]) -> Vec<Cluster> {
        let candidates: Vec<&Signal> = signals.iter().filter(|s| s.has_momentum).collect();
        if candidates.len() < self.min_cluster_size {
            tracing::debug!(
                target: "pipeline",
                candidates = candidates.len(),
                min_cluster_size = self.min_cluster_size,
                "too few momentum signals to cluster"
            );
            return Vec::new();
        }

        let keywords: Vec<Vec<String>> = candidates.iter().map(|s| extract_keywords(s)).collect();
        let groups = self.group_by_keywords(&keywords);

        let mut clusters: Vec<Cluster> = groups
            .into_iter()
            .enumerate()
            .map(|(n, members)| {
                let owned = members.into_iter().map(|i| candidates[i].clone()).collect();
                Cluster::from_members(format!("cluster_{n}"), owned)
            })
            .collect();

        clusters.sort_by(|a, b| b.cluster_score.total_cmp(&a.cluster_score));
        clusters.truncate(self.max_clusters);

        tracing::debug!(
            target: "pipeline",
            candidates = candidates.len(),
            clusters = clusters.len(),
            "clustered momentum signals"
        );
        clusters
    }

    /// One-hop grouping over per-signal keyword lists. Returns member indices
    /// (ascending) of every group that reaches `min_cluster_size`, in seed order.
    pub fn group_by_keywords(&self, keywords: &[Vec<String>]) -> Vec<Vec<usize>> {
        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, kws) in keywords.iter().enumerate() {
            for kw in kws {
                index.entry(kw.as_str()).or_default().push(i);
            }
        }

        let mut visited = vec![false; keywords.len()];
        let mut groups = Vec::new();
        for seed in 0..keywords.len() {
            if visited[seed] {
                continue;
            }
            let mut members = BTreeSet::from([seed]);
            for kw in &keywords[seed] {
                if let Some(hits) = index.get(kw.as_str()) {
                    members.extend(hits.iter().copied());
                }
            }
            for &m in &members {
                visited[m] = true;
            }
            if members.len() >= self.min_cluster_size {
                groups.push(members.into_iter().collect());
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn kws(list: &[&[&str]]) -> Vec<Vec<String>> {
        list.iter()
            .map(|k| k.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn hot(source: &str, momentum: f64) -> Signal {
        let mut s = Signal::new(source, "m", 1.0, Utc::now());
        s.momentum_score = Some(momentum);
        s.has_momentum = true;
        s
    }

    #[test]
    fn keyword_extraction_unions_all_fields() {
        let s = Signal::new("social", "topic_mentions", 3.0, Utc::now())
            .with_meta("category", "ai_agents")
            .with_meta("topic", "ai_agents")
            .with_meta("keywords", json!(["AI agents", "automation"]))
            .with_meta("topics", json!(["ai", 7, null]))
            .with_meta("tags", json!(["automation", "bots"]))
            .with_meta("engagement", 4000);
        assert_eq!(
            extract_keywords(&s),
            vec!["ai_agents", "AI agents", "automation", "ai", "bots"]
        );

        let bare = Signal::new("social", "m", 1.0, Utc::now());
        assert!(extract_keywords(&bare).is_empty());
    }

    #[test]
    fn shared_keyword_pulls_signals_together() {
        let c = SignalClusterer::new(2, 10);
        let groups = c.group_by_keywords(&kws(&[&["defi"], &["gaming"], &["defi", "yield"]]));
        // "gaming" alone is below the minimum size
        assert_eq!(groups, vec![vec![0, 2]]);
    }

    #[test]
    fn grouping_is_one_hop_not_transitive() {
        // 0 -a- 1 -b- 2 : seed 0 only reaches 1 through "a"
        let c = SignalClusterer::new(1, 10);
        let groups = c.group_by_keywords(&kws(&[&["a"], &["a", "b"], &["b"]]));
        assert_eq!(groups[0], vec![0, 1]);
        // 2 is still unvisited; its seed re-collects 1 through "b"
        assert_eq!(groups[1], vec![1, 2]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn signals_without_keywords_stay_alone() {
        let c = SignalClusterer::new(1, 10);
        let groups = c.group_by_keywords(&kws(&[&[], &[], &["x"]]));
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn score_combines_diversity_momentum_and_size() {
        let members = vec![
            hot("onchain", 40.0).with_meta("category", "ai_agents"),
            hot("development", 40.0).with_meta("category", "ai_agents"),
            hot("social", 40.0).with_meta("topic", "ai_agents"),
        ];
        let c = Cluster::from_members("cluster_0", members);
        assert_eq!(c.size, 3);
        assert_eq!(c.source_types.len(), 3);
        assert!((c.diversity_score - 1.0).abs() < 1e-12);
        assert!((c.size_score - 0.3).abs() < 1e-12);
        // (1.0*0.4 + 0.4*0.4 + 0.3*0.2) * 100 = 62
        assert!((c.cluster_score - 62.0).abs() < 1e-9);
        assert!(c.has_multi_signal_reinforcement);
        assert_eq!(c.keywords, vec!["ai_agents"]);
    }

    #[test]
    fn score_is_monotone_in_each_component() {
        let base = cluster_score(0.5, 20.0, 0.5);
        assert!(cluster_score(0.8, 20.0, 0.5) >= base);
        assert!(cluster_score(0.5, 35.0, 0.5) >= base);
        assert!(cluster_score(0.5, 20.0, 0.9) >= base);
    }

    #[test]
    fn cluster_drops_flat_signals_and_orders_by_score() {
        let mut flat = Signal::new("onchain", "m", 1.0, Utc::now()).with_meta("category", "defi");
        flat.has_momentum = false;

        let signals = vec![
            hot("onchain", 20.0).with_meta("category", "defi"),
            hot("onchain", 20.0).with_meta("category", "defi"),
            flat,
            hot("onchain", 60.0).with_meta("category", "ai"),
            hot("social", 60.0).with_meta("topic", "ai"),
        ];
        let clusters = SignalClusterer::new(2, 10).cluster(&signals);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].keywords, vec!["ai"]);
        assert_eq!(clusters[0].cluster_id, "cluster_1");
        assert_eq!(clusters[1].size, 2);
        assert!(clusters[0].cluster_score > clusters[1].cluster_score);

        let capped = SignalClusterer::new(2, 1).cluster(&signals);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].cluster_id, "cluster_1");
    }

    #[test]
    fn too_few_momentum_signals_yield_nothing() {
        let signals = vec![hot("onchain", 30.0), hot("social", 30.0)];
        assert!(SignalClusterer::new(3, 10).cluster(&signals).is_empty());
    }
}
