// src/signal.rs
//! Signal records and the small enums attached to them.
//!
//! A `Signal` is created by a collector with its raw fields filled in. The
//! normalizer and the momentum detector later add the derived fields in place;
//! raw fields are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of collaborator that produced a signal. Open-ended: anything that is not
/// one of the three known kinds is kept verbatim (lower-cased) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    Onchain,
    Development,
    Social,
    Other(String),
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::Onchain => "onchain",
            SourceType::Development => "development",
            SourceType::Social => "social",
            SourceType::Other(s) => s.as_str(),
        }
    }

    /// Known kinds get an evidence bucket; `Other` does not.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, SourceType::Other(_))
    }
}

impl From<&str> for SourceType {
    fn from(s: &str) -> Self {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "onchain" => SourceType::Onchain,
            // repository activity used to be tagged after its only provider
            "development" | "github" => SourceType::Development,
            "social" => SourceType::Social,
            _ => SourceType::Other(norm),
        }
    }
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        SourceType::from(s.as_str())
    }
}

impl From<SourceType> for String {
    fn from(s: SourceType) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group-level trajectory label assigned by the momentum detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Accelerating,
    StrongGrowth,
    Growing,
    Flat,
    Declining,
    SharpDecline,
    InsufficientData,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Accelerating => "accelerating",
            Trend::StrongGrowth => "strong_growth",
            Trend::Growing => "growing",
            Trend::Flat => "flat",
            Trend::Declining => "declining",
            Trend::SharpDecline => "sharp_decline",
            Trend::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source_type: SourceType,
    pub metric: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Open mapping: category, topic, keyword lists, tags, provider extras.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    // --- derived, filled in by later stages ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_score: Option<f64>,
    /// Signed growth percentage of the signal's group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum_score: Option<f64>,
    #[serde(default)]
    pub has_momentum: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    /// True when the signal sits in the second half of its group's window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recent: Option<bool>,
}

impl Signal {
    pub fn new(
        source_type: impl Into<SourceType>,
        metric: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            metric: metric.into(),
            value,
            timestamp,
            metadata: Map::new(),
            normalized_score: None,
            momentum_score: None,
            has_momentum: false,
            trend: None,
            is_recent: None,
        }
    }

    /// Builder-style metadata insert.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(Value::as_str)
    }

    pub fn topic(&self) -> Option<&str> {
        self.metadata.get("topic").and_then(Value::as_str)
    }
}
