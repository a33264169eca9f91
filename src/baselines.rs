//! Process-wide baseline statistics.
//!
//! Rebuildable from config; one `(mean, std)` pair per behavioral feature.
//! `std == 0` is treated as "no signal" and forces the feature's z-score to
//! zero rather than dividing by zero.

use serde::{Deserialize, Serialize};

/// A single feature's baseline distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureBaseline {
    pub mean: f64,
    pub std: f64,
}

impl FeatureBaseline {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Z-score of `value` against this baseline. Zero when `std == 0`.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.std
        }
    }
}

/// Baseline stats for every feature the Scoring Kernel consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baselines {
    pub scroll_velocity: FeatureBaseline,
    pub click_rate: FeatureBaseline,
    pub time_on_site: FeatureBaseline,
    pub time_to_cart: FeatureBaseline,
    pub heart_rate: FeatureBaseline,
    pub respiration_rate: FeatureBaseline,
}

impl Default for Baselines {
    /// Reasonable population defaults; real deployments should rebuild
    /// these from observed per-user history. Building that history is out
    /// of scope here — the service starts from these process-init
    /// defaults rather than persisting anything per-user.
    fn default() -> Self {
        Self {
            scroll_velocity: FeatureBaseline::new(800.0, 400.0),
            click_rate: FeatureBaseline::new(0.1, 0.08),
            time_on_site: FeatureBaseline::new(180.0, 120.0),
            time_to_cart: FeatureBaseline::new(120.0, 90.0),
            heart_rate: FeatureBaseline::new(72.0, 10.0),
            respiration_rate: FeatureBaseline::new(16.0, 4.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_std_forces_zero_zscore() {
        let b = FeatureBaseline::new(10.0, 0.0);
        assert_eq!(b.z_score(999.0), 0.0);
    }

    #[test]
    fn zscore_is_finite() {
        let b = FeatureBaseline::new(10.0, 2.0);
        assert!(b.z_score(f64::MAX / 2.0).is_finite() || b.z_score(1e300).is_finite());
    }
}
