//! Fusion Engine
//!
//! Merges the candidate lists of all successful outcomes into one ranking
//! and classifies it with a threshold/margin rule:
//!
//! ```text
//! top.score <  τ                      → unknown
//! top.score >= τ, top − second >= δ   → identified (identity = top)
//! otherwise                           → ambiguous
//! ```
//!
//! `second` scores 0 when there is only one candidate. Timed-out and failed
//! outcomes contribute nothing. The engine is a pure function of its input
//! and configuration.

use idfuse_common::config::FusionSettings;
use idfuse_common::models::{Candidate, Decision, FusionResult, ServiceOutcome};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

/// Absorbs binary rounding in `top - second` so that e.g. 0.95 - 0.75
/// still counts as a 0.2 lead
const MARGIN_EPSILON: f64 = 1e-9;

/// Decision rule parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// τ: minimum top score for a positive decision
    pub threshold: f64,
    /// δ: minimum lead of the top score over the runner-up
    pub margin: f64,
}

impl FusionConfig {
    pub fn new(threshold: f64, margin: f64) -> Result<Self, FusionError> {
        if !(0.0..=1.0).contains(&threshold) || !(0.0..=1.0).contains(&margin) {
            return Err(FusionError::InvalidConfig { threshold, margin });
        }
        Ok(Self { threshold, margin })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            margin: 0.2,
        }
    }
}

impl TryFrom<FusionSettings> for FusionConfig {
    type Error = FusionError;

    fn try_from(settings: FusionSettings) -> Result<Self, Self::Error> {
        Self::new(settings.threshold, settings.margin)
    }
}

/// Contract breaches detected during fusion
///
/// Backend failures never show up here; they are already folded into the
/// outcome set. An error from the engine means the input itself is broken.
#[derive(Debug, Error, PartialEq)]
pub enum FusionError {
    #[error("Candidate {label:?} from {service_id} has unusable score {score}")]
    InvalidScore {
        service_id: String,
        label: String,
        score: f64,
    },

    #[error("Invalid fusion parameters: threshold {threshold}, margin {margin}")]
    InvalidConfig { threshold: f64, margin: f64 },
}

/// Descriptive statistics over a fused candidate list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSummary {
    pub total_candidates: usize,
    pub above_threshold: usize,
    pub max_score: f64,
    pub avg_score: f64,
    pub score_spread: f64,
    pub threshold: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> FusionConfig {
        self.config
    }

    /// Fuse an outcome set into a decision
    ///
    /// # Errors
    /// [`FusionError::InvalidScore`] when a successful outcome carries a
    /// score that is not a finite number within 0.0-1.0.
    pub fn fuse(&self, outcomes: &[ServiceOutcome]) -> Result<FusionResult, FusionError> {
        let mut candidates: Vec<Candidate> = outcomes
            .iter()
            .filter(|outcome| outcome.is_ok())
            .filter_map(|outcome| outcome.candidates.as_ref())
            .flatten()
            .cloned()
            .collect();

        if let Some(bad) = candidates
            .iter()
            .find(|c| !c.score.is_finite() || !(0.0..=1.0).contains(&c.score))
        {
            return Err(FusionError::InvalidScore {
                service_id: bad.source_service_id.clone(),
                label: bad.label.clone(),
                score: bad.score,
            });
        }

        if candidates.is_empty() {
            debug!(outcomes = outcomes.len(), "No candidates to fuse");
            return Ok(FusionResult::unknown(Vec::new()));
        }

        candidates.sort_by(rank);

        let top = &candidates[0];
        let second_score = candidates.get(1).map_or(0.0, |c| c.score);

        let decision = if top.score < self.config.threshold {
            Decision::Unknown
        } else if top.score - second_score >= self.config.margin - MARGIN_EPSILON {
            Decision::Identified
        } else {
            Decision::Ambiguous
        };

        debug!(
            candidates = candidates.len(),
            top_label = %top.label,
            top_score = top.score,
            second_score,
            decision = %decision,
            "Fusion complete"
        );

        let identity = (decision == Decision::Identified).then(|| top.clone());

        Ok(FusionResult {
            decision,
            identity,
            candidates,
        })
    }

    /// Summary statistics for a candidate list
    pub fn summarize(&self, candidates: &[Candidate]) -> FusionSummary {
        let mut summary = FusionSummary {
            total_candidates: candidates.len(),
            above_threshold: 0,
            max_score: 0.0,
            avg_score: 0.0,
            score_spread: 0.0,
            threshold: self.config.threshold,
            margin: self.config.margin,
        };

        if candidates.is_empty() {
            return summary;
        }

        let max = candidates.iter().map(|c| c.score).fold(f64::MIN, f64::max);
        let min = candidates.iter().map(|c| c.score).fold(f64::MAX, f64::min);
        let sum: f64 = candidates.iter().map(|c| c.score).sum();

        summary.above_threshold = candidates
            .iter()
            .filter(|c| c.score >= self.config.threshold)
            .count();
        summary.max_score = max;
        summary.avg_score = sum / candidates.len() as f64;
        summary.score_spread = if candidates.len() > 1 { max - min } else { 0.0 };
        summary
    }
}

/// Score descending, then service id ascending, then label ascending
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.source_service_id.cmp(&b.source_service_id))
        .then_with(|| a.label.cmp(&b.label))
}
