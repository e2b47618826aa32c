// src/narrative.rs
//! # Narrative Detector
//! Promotes clusters that pass every qualification threshold to ranked
//! `Narrative` records. Purely algorithmic: names are placeholders that an
//! explanation stage may replace later.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::cluster::Cluster;
use crate::signal::{Signal, SourceType};

/// Fixed quality floor a cluster score must reach.
pub const CLUSTER_QUALITY_FLOOR: f64 = 30.0;
/// Momentum (in %) mapped to a full 100 in the strength score.
pub const MOMENTUM_CAP_PCT: f64 = 50.0;
pub const STRENGTH_MOMENTUM_WEIGHT: f64 = 0.6;
pub const STRENGTH_CLUSTER_WEIGHT: f64 = 0.4;
/// Keywords used for the placeholder name.
pub const NAME_KEYWORDS: usize = 3;
pub const UNNAMED_NARRATIVE: &str = "unnamed_narrative";

/// One piece of supporting data, bucketed by source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub metric: String,
    pub value: f64,
    pub momentum: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl From<&Signal> for EvidenceItem {
    fn from(s: &Signal) -> Self {
        Self {
            metric: s.metric.clone(),
            value: s.value,
            momentum: s.momentum_score.unwrap_or(0.0),
            metadata: s.metadata.clone(),
        }
    }
}

/// Evidence keyed only by recognized source types that actually occur.
pub type Evidence = BTreeMap<SourceType, Vec<EvidenceItem>>;

/// A product idea proposed for a narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdea {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub narrative_id: String,
    /// Heuristic name; see `title` for the explained one.
    pub name: String,
    pub keywords: Vec<String>,
    pub source_types: Vec<SourceType>,
    pub signals: Vec<Signal>,
    pub momentum_score: f64,
    pub cluster_score: f64,
    pub strength_score: f64,
    pub signal_count: usize,
    pub evidence: Evidence,

    // --- explanation stage ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub why_it_matters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_ideas: Vec<BuildIdea>,
}

impl Narrative {
    pub fn from_cluster(cluster: Cluster) -> Self {
        let evidence = build_evidence(&cluster.signals);
        Self {
            narrative_id: cluster.cluster_id,
            name: narrative_name(&cluster.keywords),
            strength_score: strength_score(cluster.avg_momentum, cluster.cluster_score),
            momentum_score: cluster.avg_momentum,
            cluster_score: cluster.cluster_score,
            signal_count: cluster.signals.len(),
            keywords: cluster.keywords,
            source_types: cluster.source_types,
            signals: cluster.signals,
            evidence,
            title: None,
            explanation: None,
            why_it_matters: Vec::new(),
            build_ideas: Vec::new(),
        }
    }

    /// Explained title when present, placeholder name otherwise.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NarrativeDetector {
    min_signal_types: usize,
    min_momentum_score: f64,
    max_narratives: usize,
}

impl NarrativeDetector {
    pub fn new(min_signal_types: usize, min_momentum_score: f64, max_narratives: usize) -> Self {
        Self {
            min_signal_types,
            min_momentum_score,
            max_narratives,
        }
    }

    /// All three conditions must hold.
    pub fn qualifies(&self, cluster: &Cluster) -> bool {
        cluster.source_types.len() >= self.min_signal_types
            && cluster.avg_momentum >= self.min_momentum_score
            && cluster.cluster_score >= CLUSTER_QUALITY_FLOOR
    }

    /// Qualify, convert, rank by strength and truncate. An empty result is a
    /// valid outcome.
    pub fn detect(&self, clusters: Vec<Cluster>) -> Vec<Narrative> {
        let total = clusters.len();
        let mut narratives: Vec<Narrative> = clusters
            .into_iter()
            .filter(|c| {
                let ok = self.qualifies(c);
                if !ok {
                    tracing::trace!(
                        target: "pipeline",
                        cluster = %c.cluster_id,
                        source_types = c.source_types.len(),
                        avg_momentum = c.avg_momentum,
                        cluster_score = c.cluster_score,
                        "cluster rejected"
                    );
                }
                ok
            })
            .map(Narrative::from_cluster)
            .collect();

        narratives.sort_by(|a, b| b.strength_score.total_cmp(&a.strength_score));
        narratives.truncate(self.max_narratives);

        tracing::debug!(
            target: "pipeline",
            clusters = total,
            narratives = narratives.len(),
            "narratives detected"
        );
        narratives
    }
}

/// `min(momentum / 50 * 100, 100) * 0.6 + cluster_score * 0.4`, capped at 100.
pub fn strength_score(avg_momentum: f64, cluster_score: f64) -> f64 {
    let momentum_normalized = (avg_momentum / MOMENTUM_CAP_PCT * 100.0).min(100.0);
    (momentum_normalized * STRENGTH_MOMENTUM_WEIGHT + cluster_score * STRENGTH_CLUSTER_WEIGHT)
        .min(100.0)
}

/// First three keywords joined with `_`, each space replaced by `_`, lower-cased.
/// Runs of spaces are kept as runs of underscores.
pub fn narrative_name(keywords: &[String]) -> String {
    if keywords.is_empty() {
        return UNNAMED_NARRATIVE.to_string();
    }
    keywords
        .iter()
        .take(NAME_KEYWORDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("_")
        .replace(' ', "_")
        .to_lowercase()
}

/// Bucket member signals by source type; unrecognized types are skipped here
/// but remain part of the narrative itself.
pub fn build_evidence(signals: &[Signal]) -> Evidence {
    let mut evidence = Evidence::new();
    for s in signals.iter().filter(|s| s.source_type.is_recognized()) {
        evidence
            .entry(s.source_type.clone())
            .or_default()
            .push(EvidenceItem::from(s));
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cluster(types: &[&str], avg_momentum: f64, cluster_score: f64) -> Cluster {
        let signals = types
            .iter()
            .map(|t| {
                let mut s = Signal::new(*t, "m", 10.0, Utc::now()).with_meta("category", "ai_agents");
                s.momentum_score = Some(avg_momentum);
                s.has_momentum = true;
                s
            })
            .collect::<Vec<_>>();
        let mut c = Cluster::from_members("cluster_0", signals);
        c.avg_momentum = avg_momentum;
        c.cluster_score = cluster_score;
        c
    }

    #[test]
    fn strength_matches_worked_example() {
        assert!((strength_score(40.0, 60.0) - 72.0).abs() < 1e-9);
        // momentum above the cap saturates
        assert!((strength_score(90.0, 50.0) - 80.0).abs() < 1e-9);
    }

    #[test]
    fn qualification_is_a_strict_conjunction() {
        let d = NarrativeDetector::new(2, 20.0, 7);
        assert!(d.qualifies(&cluster(&["onchain", "social"], 40.0, 60.0)));
        // diversity fails
        assert!(!d.qualifies(&cluster(&["onchain", "onchain"], 40.0, 60.0)));
        // momentum fails
        assert!(!d.qualifies(&cluster(&["onchain", "social"], 19.9, 60.0)));
        // quality floor fails
        assert!(!d.qualifies(&cluster(&["onchain", "social"], 40.0, 29.9)));
    }

    #[test]
    fn detect_ranks_and_truncates() {
        let mut weak = cluster(&["onchain", "social"], 25.0, 40.0);
        weak.cluster_id = "cluster_weak".into();
        let mut strong = cluster(&["onchain", "development"], 45.0, 70.0);
        strong.cluster_id = "cluster_strong".into();
        let rejected = cluster(&["social"], 80.0, 90.0);

        let d = NarrativeDetector::new(2, 20.0, 7);
        let out = d.detect(vec![weak.clone(), rejected, strong.clone()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].narrative_id, "cluster_strong");
        assert!(out[0].strength_score > out[1].strength_score);

        let capped = NarrativeDetector::new(2, 20.0, 1).detect(vec![weak, strong]);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].narrative_id, "cluster_strong");
    }

    #[test]
    fn nothing_qualifies_is_an_empty_list() {
        let d = NarrativeDetector::new(3, 20.0, 7);
        assert!(d.detect(vec![cluster(&["onchain", "social"], 40.0, 60.0)]).is_empty());
        assert!(d.detect(Vec::new()).is_empty());
    }

    #[test]
    fn name_uses_first_three_keywords() {
        let kw = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            narrative_name(&kw(&["AI agents", "Automation", "bots", "extra"])),
            "ai_agents_automation_bots"
        );
        assert_eq!(narrative_name(&[]), UNNAMED_NARRATIVE);
    }

    #[test]
    fn name_maps_every_space_to_an_underscore() {
        let kw = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(narrative_name(&kw(&["a  b", "C"])), "a__b_c");
        assert_eq!(narrative_name(&kw(&[" lead"])), "_lead");
    }

    #[test]
    fn evidence_skips_unrecognized_source_types() {
        let c = cluster(&["onchain", "podcasts", "social", "social"], 30.0, 50.0);
        let n = Narrative::from_cluster(c);
        assert_eq!(n.signal_count, 4);
        assert_eq!(n.source_types.len(), 3);
        assert_eq!(n.evidence.len(), 2);
        assert_eq!(n.evidence[&SourceType::Social].len(), 2);
        assert!(!n.evidence.contains_key(&SourceType::Development));
        assert!((n.evidence[&SourceType::Onchain][0].momentum - 30.0).abs() < 1e-9);

        let v = serde_json::to_value(&n).unwrap();
        assert!(v["evidence"]["social"].is_array());
        assert!(v.get("title").is_none());
    }
}
