//! Decision Threshold
//!
//! The threshold is the (1 - contamination) quantile of the anomaly scores
//! over the training set, so roughly `contamination` of the training points
//! land strictly above it.

use serde::{Deserialize, Serialize};

/// Linear-interpolation quantile, `q` in [0, 1]. `None` on empty input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;

    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Score cut-off for an expected anomaly fraction
pub fn contamination_threshold(scores: &[f64], contamination: f64) -> Option<f64> {
    quantile(scores, 1.0 - contamination)
}

/// Share of scores strictly above the threshold
pub fn anomaly_fraction(scores: &[f64], threshold: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().filter(|&&s| s > threshold).count() as f64 / scores.len() as f64
}

/// Distribution summary of the training scores, kept with the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    pub threshold: f64,
    pub mean_score: f64,
    pub max_score: f64,
    /// Training points above the threshold
    pub flagged_fraction: f64,
}

impl ThresholdStats {
    pub fn from_scores(scores: &[f64], threshold: f64) -> Self {
        let n = scores.len().max(1) as f64;
        Self {
            threshold,
            mean_score: scores.iter().sum::<f64>() / n,
            max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            flagged_fraction: anomaly_fraction(scores, threshold),
        }
    }
}
