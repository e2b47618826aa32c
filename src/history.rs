//! history.rs: bounded in-memory log of completed runs, served by `/api/runs`.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::PipelineReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_signals: usize,
    pub momentum_signals: usize,
    pub narratives: usize,
    // short fingerprint of the result for quick diagnostics
    pub top_names: Vec<String>,
    pub top_strengths: Vec<f64>,
}

impl From<&PipelineReport> for RunSummary {
    fn from(r: &PipelineReport) -> Self {
        let top = r.narratives.iter().take(3);
        Self {
            run_id: r.run_id,
            generated_at: r.generated_at,
            total_signals: r.stats.total_signals,
            momentum_signals: r.stats.momentum_signals,
            narratives: r.narratives.len(),
            top_names: top.clone().map(|n| n.display_name().to_string()).collect(),
            top_strengths: top.map(|n| n.strength_score).collect(),
        }
    }
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunSummary>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.min(10_000),
        }
    }

    pub fn push(&self, report: &PipelineReport) {
        let entry = RunSummary::from(report);
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunSummary> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStats;

    fn report(total: usize) -> PipelineReport {
        PipelineReport {
            run_id: Uuid::new_v4(),
            window_days: 14,
            generated_at: Utc::now(),
            period_start: Utc::now(),
            period_end: Utc::now(),
            stats: PipelineStats {
                total_signals: total,
                ..PipelineStats::default()
            },
            momentum: Default::default(),
            narratives: Vec::new(),
        }
    }

    #[test]
    fn keeps_only_the_newest_entries() {
        let h = RunHistory::with_capacity(2);
        for total in [1, 2, 3] {
            h.push(&report(total));
        }
        let snap = h.snapshot_last_n(10);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].total_signals, 2);
        assert_eq!(snap[1].total_signals, 3);
        assert_eq!(h.snapshot_last_n(1)[0].total_signals, 3);
    }
}
