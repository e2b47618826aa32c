// src/momentum.rs
//! # Momentum Detector
//! Compares the recent half of each signal group against its baseline half and
//! tags every member with the group's growth, trend and momentum flag.
//!
//! Groups are keyed by `(source_type, metric, metadata.category)`. Within a group
//! the series is sorted chronologically and split at `len / 2`; the second half
//! (midpoint included) is "recent". Growth is the percentage change between the
//! arithmetic means of the two halves.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::signal::{Signal, SourceType, Trend};

/// Growth within +/- this band counts as flat.
pub const FLAT_BAND_PCT: f64 = 5.0;
/// Growth at or above `threshold * ACCELERATION_FACTOR` is "accelerating".
pub const ACCELERATION_FACTOR: f64 = 1.5;

type GroupKey = (SourceType, String, Option<String>);

#[derive(Debug, Clone, Copy)]
pub struct MomentumDetector {
    threshold_pct: f64,
    window_days: u32,
}

/// Aggregate view over already tagged signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentumSummary {
    pub count: usize,
    pub avg_momentum: f64,
    pub max_momentum: f64,
    pub signals_with_momentum: usize,
    pub momentum_rate: f64,
}

impl MomentumDetector {
    pub fn new(threshold_pct: f64, window_days: u32) -> Self {
        Self {
            threshold_pct,
            window_days,
        }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    /// Informational; the split is driven by the signals' own timestamps.
    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Tag every signal in place. Returns how many signals carry momentum.
    pub fn detect(&self, signals: &mut [Signal]) -> usize {
        let mut groups: HashMap<GroupKey, Vec<usize>> = HashMap::new();
        for (i, s) in signals.iter().enumerate() {
            let key = (
                s.source_type.clone(),
                s.metric.clone(),
                s.category().map(str::to_string),
            );
            groups.entry(key).or_default().push(i);
        }

        for idxs in groups.values_mut() {
            self.tag_group(signals, idxs);
        }

        let flagged = signals.iter().filter(|s| s.has_momentum).count();
        tracing::debug!(
            target: "pipeline",
            groups = groups.len(),
            flagged,
            threshold_pct = self.threshold_pct,
            "momentum detected"
        );
        flagged
    }

    fn tag_group(&self, signals: &mut [Signal], idxs: &mut [usize]) {
        if idxs.len() < 2 {
            for &i in idxs.iter() {
                let s = &mut signals[i];
                s.momentum_score = Some(0.0);
                s.has_momentum = false;
                s.trend = Some(Trend::InsufficientData);
                s.is_recent = None;
            }
            return;
        }

        // stable: equal timestamps keep their batch order
        idxs.sort_by_key(|&i| signals[i].timestamp);
        let mid = idxs.len() / 2;
        let (baseline, recent) = idxs.split_at(mid);

        let baseline_mean = mean(baseline.iter().map(|&i| signals[i].value));
        let recent_mean = mean(recent.iter().map(|&i| signals[i].value));
        let growth = growth_pct(baseline_mean, recent_mean);
        let trend = self.classify(growth);
        let has_momentum = self.has_momentum(growth);

        for (pos, &i) in idxs.iter().enumerate() {
            let s = &mut signals[i];
            s.momentum_score = Some(growth);
            s.has_momentum = has_momentum;
            s.trend = Some(trend);
            s.is_recent = Some(pos >= mid);
        }
    }

    /// Trend label for a growth percentage, checked top-down.
    pub fn classify(&self, growth_pct: f64) -> Trend {
        if growth_pct >= self.threshold_pct * ACCELERATION_FACTOR {
            Trend::Accelerating
        } else if growth_pct >= self.threshold_pct {
            Trend::StrongGrowth
        } else if growth_pct > FLAT_BAND_PCT {
            Trend::Growing
        } else if growth_pct > -FLAT_BAND_PCT {
            Trend::Flat
        } else if growth_pct > -self.threshold_pct {
            Trend::Declining
        } else {
            Trend::SharpDecline
        }
    }

    /// Momentum only exists for positive growth at or above the threshold.
    pub fn has_momentum(&self, growth_pct: f64) -> bool {
        growth_pct >= self.threshold_pct && growth_pct > 0.0
    }

    /// Summary over tagged signals, optionally restricted to one source type.
    pub fn aggregate(signals: &[Signal], source_type: Option<&SourceType>) -> MomentumSummary {
        let selected: Vec<&Signal> = signals
            .iter()
            .filter(|s| source_type.map_or(true, |t| &s.source_type == t))
            .collect();
        if selected.is_empty() {
            return MomentumSummary::default();
        }

        let scores: Vec<f64> = selected.iter().filter_map(|s| s.momentum_score).collect();
        let with_momentum = selected.iter().filter(|s| s.has_momentum).count();
        let max_momentum = if scores.is_empty() {
            0.0
        } else {
            scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        };

        MomentumSummary {
            count: selected.len(),
            avg_momentum: mean(scores.iter().copied()),
            max_momentum,
            signals_with_momentum: with_momentum,
            momentum_rate: with_momentum as f64 / selected.len() as f64,
        }
    }
}

/// Percentage change from `baseline` to `recent`; a zero baseline yields 0.0.
pub fn growth_pct(baseline: f64, recent: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (recent - baseline) / baseline * 100.0
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
