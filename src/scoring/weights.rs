//! Named feature-weight profiles for the Scoring Kernel's weighted sum.

use serde::{Deserialize, Serialize};

/// Per-feature weight used in the kernel's weighted likelihood sum.
/// All fields are non-negative and sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    pub scroll_velocity: f64,
    pub click_rate: f64,
    pub time_to_cart: f64,
    pub emotion_arousal: f64,
    pub heart_rate: f64,
    pub respiration_rate: f64,
}

impl Weights {
    fn sum(&self) -> f64 {
        self.scroll_velocity
            + self.click_rate
            + self.time_to_cart
            + self.emotion_arousal
            + self.heart_rate
            + self.respiration_rate
    }

    #[cfg(test)]
    fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() < 1e-9
    }
}

/// Which named weight profile the kernel should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightProfile {
    /// Default: biometric channels are placeholders, so the four telemetry
    /// features carry the renormalized original weight mass.
    BehaviorOnly,
    /// Reserved for when a biometric sidecar supplies real heart-rate and
    /// respiration data; no such sidecar is implemented here, but the
    /// profile is part of the kernel's contract.
    FullBiometric,
}

impl WeightProfile {
    pub fn weights(self) -> Weights {
        match self {
            WeightProfile::BehaviorOnly => Weights {
                scroll_velocity: 0.32,
                click_rate: 0.21,
                time_to_cart: 0.21,
                emotion_arousal: 0.26,
                heart_rate: 0.0,
                respiration_rate: 0.0,
            },
            WeightProfile::FullBiometric => Weights {
                scroll_velocity: 0.20,
                click_rate: 0.15,
                time_to_cart: 0.15,
                emotion_arousal: 0.20,
                heart_rate: 0.15,
                respiration_rate: 0.15,
            },
        }
    }
}
