// src/error.rs
//! Typed errors: misconfiguration caught before a run, and runs that had no
//! data to score.
//!
//! Data-shape irregularities (constant series, zero baselines, missing metadata)
//! never surface here; they resolve to neutral defaults inside each stage.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown normalization method: {0:?} (expected \"minmax\" or \"zscore\")")]
    UnknownNormalizationMethod(String),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },

    #[error("unknown llm provider: {0:?} (expected \"template\", \"openai\" or \"local\")")]
    UnknownLlmProvider(String),
}

impl ConfigError {
    pub(crate) fn non_positive(name: &'static str, value: f64) -> Self {
        Self::NonPositive { name, value }
    }
}

/// A collect-and-run that could not produce a batch at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("every source failed without a fallback: {}", .0.join(", "))]
    AllSourcesFailed(Vec<&'static str>),
}
