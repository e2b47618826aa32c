// src/normalize.rs
//! # Normalizer
//! Rescales raw values onto `[0, 1]` within each `(source_type, metric)` group,
//! so that transaction counts and star counts can be compared later on.
//!
//! Constant groups (single value, all-equal series, zero variance) are not errors;
//! every member receives the neutral score `0.5`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::signal::{Signal, SourceType};

/// Score assigned to every member of a degenerate group.
pub const NEUTRAL_SCORE: f64 = 0.5;
/// Z-scores are clipped to `[-ZSCORE_CLIP, ZSCORE_CLIP]` before remapping.
pub const ZSCORE_CLIP: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    #[default]
    MinMax,
    ZScore,
}

impl NormalizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMethod::MinMax => "minmax",
            NormalizationMethod::ZScore => "zscore",
        }
    }
}

impl FromStr for NormalizationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minmax" => Ok(NormalizationMethod::MinMax),
            "zscore" => Ok(NormalizationMethod::ZScore),
            _ => Err(ConfigError::UnknownNormalizationMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    method: NormalizationMethod,
}

impl Normalizer {
    pub fn new(method: NormalizationMethod) -> Self {
        Self { method }
    }

    /// Resolve the method by its configured name. Unknown names fail here,
    /// before any group is touched.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(name.parse()?))
    }

    pub fn method(&self) -> NormalizationMethod {
        self.method
    }

    /// Populate `normalized_score` on every signal. Order of the slice is kept.
    pub fn normalize(&self, signals: &mut [Signal]) {
        let mut groups: HashMap<(SourceType, String), Vec<usize>> = HashMap::new();
        for (i, s) in signals.iter().enumerate() {
            groups
                .entry((s.source_type.clone(), s.metric.clone()))
                .or_default()
                .push(i);
        }

        for idxs in groups.values() {
            let values: Vec<f64> = idxs.iter().map(|&i| signals[i].value).collect();
            let scores = match self.method {
                NormalizationMethod::MinMax => minmax(&values),
                NormalizationMethod::ZScore => zscore(&values),
            };
            for (&i, score) in idxs.iter().zip(scores) {
                signals[i].normalized_score = Some(score);
            }
        }

        tracing::debug!(
            target: "pipeline",
            method = self.method.as_str(),
            groups = groups.len(),
            signals = signals.len(),
            "normalized signals"
        );
    }
}

/// `(x - min) / (max - min)`; constant input maps to the neutral score.
pub fn minmax(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if values.is_empty() || span == 0.0 || !span.is_finite() {
        return vec![NEUTRAL_SCORE; values.len()];
    }
    values.iter().map(|x| (x - min) / span).collect()
}

/// Population z-score, clipped to +/-3 and remapped linearly onto `[0, 1]`.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return vec![NEUTRAL_SCORE; values.len()];
    }
    values
        .iter()
        .map(|x| {
            let z = ((x - mean) / std).clamp(-ZSCORE_CLIP, ZSCORE_CLIP);
            (z + ZSCORE_CLIP) / (2.0 * ZSCORE_CLIP)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sig(source: &str, metric: &str, value: f64, day: i64) -> Signal {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        Signal::new(source, metric, value, base + Duration::days(day))
    }

    #[test]
    fn minmax_maps_extremes_to_zero_and_one() {
        let mut v = vec![
            sig("onchain", "tvl", 10.0, 0),
            sig("onchain", "tvl", 30.0, 1),
            sig("onchain", "tvl", 20.0, 2),
        ];
        Normalizer::new(NormalizationMethod::MinMax).normalize(&mut v);
        assert_eq!(v[0].normalized_score, Some(0.0));
        assert_eq!(v[1].normalized_score, Some(1.0));
        assert_eq!(v[2].normalized_score, Some(0.5));
    }

    #[test]
    fn groups_are_normalized_independently() {
        let mut v = vec![
            sig("onchain", "tvl", 5_000_000_000.0, 0),
            sig("onchain", "tvl", 6_000_000_000.0, 1),
            sig("social", "topic_mentions", 5.0, 0),
            sig("social", "topic_mentions", 75.0, 1),
            // same metric name, different source type: its own group
            sig("development", "tvl", 42.0, 0),
        ];
        Normalizer::new(NormalizationMethod::MinMax).normalize(&mut v);
        assert_eq!(v[0].normalized_score, Some(0.0));
        assert_eq!(v[1].normalized_score, Some(1.0));
        assert_eq!(v[2].normalized_score, Some(0.0));
        assert_eq!(v[3].normalized_score, Some(1.0));
        assert_eq!(v[4].normalized_score, Some(NEUTRAL_SCORE));
    }

    #[test]
    fn constant_series_is_neutral_for_both_methods() {
        for method in [NormalizationMethod::MinMax, NormalizationMethod::ZScore] {
            let mut v = vec![sig("social", "m", 7.0, 0), sig("social", "m", 7.0, 1)];
            Normalizer::new(method).normalize(&mut v);
            assert!(v.iter().all(|s| s.normalized_score == Some(0.5)));
        }
    }

    #[test]
    fn zscore_is_clipped_into_unit_range() {
        let mut values = vec![0.0; 99];
        values.push(1_000.0);
        let out = zscore(&values);
        assert!(out.iter().all(|x| (0.0..=1.0).contains(x)));
        // the outlier is far beyond 3 sigma
        assert_eq!(*out.last().unwrap(), 1.0);

        let sym = zscore(&[1.0, 3.0]);
        // z = -1 and +1 -> (2/6, 4/6)
        assert!((sym[0] - 2.0 / 6.0).abs() < 1e-12);
        assert!((sym[1] - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_method_is_rejected_up_front() {
        let err = Normalizer::from_name("rank").unwrap_err();
        assert_eq!(err, ConfigError::UnknownNormalizationMethod("rank".into()));
        assert_eq!(
            Normalizer::from_name(" ZScore ").unwrap().method(),
            NormalizationMethod::ZScore
        );
    }

    #[test]
    fn renormalizing_is_idempotent() {
        let mut v = vec![
            sig("onchain", "tvl", 3.0, 0),
            sig("onchain", "tvl", 9.0, 1),
            sig("onchain", "tvl", 4.0, 2),
        ];
        let n = Normalizer::new(NormalizationMethod::ZScore);
        n.normalize(&mut v);
        let first = v.clone();
        n.normalize(&mut v);
        assert_eq!(first, v);
    }
}
