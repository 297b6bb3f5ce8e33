//! Standard scaler: per-feature z-score with population standard deviation

use serde::{Deserialize, Serialize};

/// Relative spread below which a feature counts as constant
const DEGENERATE_STD_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

impl ScalerParams {
    /// Fit on row-major data. `None` if there are no rows.
    pub fn fit(rows: &[Vec<f64>]) -> Option<Self> {
        let n_features = rows.first()?.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in means.iter_mut() {
            *m /= n;
        }

        // Two-pass variance
        let mut std_devs = vec![0.0; n_features];
        for row in rows {
            for ((s, v), m) in std_devs.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in std_devs.iter_mut() {
            *s = (*s / n).sqrt();
        }

        Some(Self { means, std_devs })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Feature `i` had (numerically) no spread in training
    pub fn is_degenerate(&self, i: usize) -> bool {
        let scale = self.means[i].abs().max(1.0);
        self.std_devs[i] <= DEGENERATE_STD_EPSILON * scale
    }

    /// Standardize one point; degenerate features map to 0
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if i >= self.n_features() || self.is_degenerate(i) {
                    0.0
                } else {
                    (v - self.means[i]) / self.std_devs[i]
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaler = ScalerParams::fit(&rows).unwrap();

        assert_eq!(scaler.means, vec![3.0, 10.0]);
        let expected_std = (8.0f64 / 3.0).sqrt();
        assert!((scaler.std_devs[0] - expected_std).abs() < 1e-12);

        let z = scaler.transform(&[5.0, 10.0]);
        assert!((z[0] - 2.0 / expected_std).abs() < 1e-12);
        assert_eq!(z[1], 0.0);
    }

    #[test]
    fn test_zero_variance_maps_to_zero() {
        let rows = vec![vec![40.0]; 500];
        let scaler = ScalerParams::fit(&rows).unwrap();

        assert!(scaler.is_degenerate(0));
        assert_eq!(scaler.transform(&[40.0]), vec![0.0]);
        assert_eq!(scaler.transform(&[99.0]), vec![0.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(ScalerParams::fit(&[]).is_none());
    }
}
