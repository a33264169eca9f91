//! Request-scoped telemetry types.

use serde::{Deserialize, Serialize};

/// Behavioral telemetry plus product/price/host context submitted with a
/// purchase event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Seconds from page load to "Add to Cart"/"Buy Now", if the extension
    /// could measure it.
    #[serde(default)]
    pub time_to_cart: Option<f64>,

    /// Seconds the user has spent on the site this session. Must be > 0.
    pub time_on_site: f64,

    /// Number of clicks observed this session.
    pub click_count: u64,

    /// Peak scroll velocity, in pixels/second.
    pub peak_scroll_velocity: f64,

    /// Hour of day in the user's local time, 0-23.
    pub system_hour: u8,

    /// Product name/description.
    pub product: String,

    /// Listed price.
    pub cost: f64,

    /// Hostname of the shopping site.
    pub website: String,

    /// Self-reported or sidecar-measured emotional arousal in [0,1].
    /// Optional: the Fast Stage defaults to 0.5 (neutral) when absent.
    #[serde(default)]
    pub emotion_arousal: Option<f64>,

    /// Optional biometric readings (full_biometric weight profile only).
    /// No sidecar populates these today; the fields exist so one could be
    /// added later without a schema break.
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub respiration_rate: Option<f64>,
}

impl TelemetrySample {
    /// Validate the constraints a telemetry sample must satisfy before it
    /// can be scored. Returns a human-readable description of the first
    /// violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_on_site <= 0.0 {
            return Err("time_on_site must be > 0".to_string());
        }
        if self.peak_scroll_velocity < 0.0 {
            return Err("peak_scroll_velocity must be >= 0".to_string());
        }
        if self.cost < 0.0 {
            return Err("cost must be >= 0".to_string());
        }
        if self.system_hour > 23 {
            return Err(format!(
                "system_hour must be in [0,23], got {}",
                self.system_hour
            ));
        }
        if let Some(ttc) = self.time_to_cart {
            if !ttc.is_finite() {
                return Err("time_to_cart must be finite".to_string());
            }
        }
        if self.product.trim().is_empty() {
            return Err("product must not be empty".to_string());
        }
        if self.website.trim().is_empty() {
            return Err("website must not be empty".to_string());
        }
        Ok(())
    }

    /// Derived click rate: `click_count / max(time_on_site, 1)`.
    pub fn click_rate(&self) -> f64 {
        self.click_count as f64 / self.time_on_site.max(1.0)
    }

    /// Effective time-to-cart: falls back to `time_on_site` when absent.
    pub fn effective_time_to_cart(&self) -> f64 {
        self.time_to_cart.unwrap_or(self.time_on_site)
    }

    /// Emotional arousal with the documented default.
    pub fn effective_arousal(&self) -> f64 {
        self.emotion_arousal.unwrap_or(0.5).clamp(0.0, 1.0)
    }

    /// A short query string used to retrieve relevant memory snippets:
    /// `"<product> $<cost> <website>"`.
    pub fn retrieval_query(&self) -> String {
        format!("{} ${:.2} {}", self.product, self.cost, self.website)
    }

    /// Whether the request's hour falls in the "LATE NIGHT" label window
    /// used by the Reasoner's prompt.
    pub fn is_late_night(&self) -> bool {
        self.system_hour >= 23 || self.system_hour <= 5
    }
}
