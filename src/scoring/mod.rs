//! Scoring Kernel (component A): a pure, deterministic Bayesian fusion of
//! behavioral telemetry into an impulse probability plus a justification
//! trace.
//!
//! No exceptions, no panics: every branch produces a finite, clamped
//! result even at extreme inputs.

pub mod weights;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::baselines::Baselines;
use crate::telemetry::TelemetrySample;
use weights::WeightProfile;

/// Sigmoid steepness for z-score -> likelihood mapping.
const SIGMOID_K: f64 = 2.0;

/// Likelihood clamp bounds, guaranteeing finiteness through the Bayesian
/// update even at extreme z-scores.
const LIKELIHOOD_MIN: f64 = 1e-6;
const LIKELIHOOD_MAX: f64 = 1.0 - 1e-6;

/// The behavioral features the kernel reasons over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ScrollVelocity,
    ClickRate,
    TimeToCart,
    EmotionArousal,
    HeartRate,
    RespirationRate,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::ScrollVelocity => "scroll_velocity",
            Feature::ClickRate => "click_rate",
            Feature::TimeToCart => "time_to_cart",
            Feature::EmotionArousal => "emotion_arousal",
            Feature::HeartRate => "heart_rate",
            Feature::RespirationRate => "respiration_rate",
        }
    }

    const ALL: [Feature; 6] = [
        Feature::ScrollVelocity,
        Feature::ClickRate,
        Feature::TimeToCart,
        Feature::EmotionArousal,
        Feature::HeartRate,
        Feature::RespirationRate,
    ];
}

/// Intervention level returned alongside a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intervention {
    None,
    Mirror,
    Cooldown,
    Phrase,
}

impl Intervention {
    /// Map a probability to an intervention level:
    /// `<0.3 -> NONE`, `<0.6 -> MIRROR`, `<0.85 -> COOLDOWN`, else `PHRASE`.
    pub fn from_probability(p: f64) -> Self {
        if p < 0.3 {
            Intervention::None
        } else if p < 0.6 {
            Intervention::Mirror
        } else if p < 0.85 {
            Intervention::Cooldown
        } else {
            Intervention::Phrase
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intervention::None => "NONE",
            Intervention::Mirror => "MIRROR",
            Intervention::Cooldown => "COOLDOWN",
            Intervention::Phrase => "PHRASE",
        }
    }

    /// Parse the four allowed values, case-insensitively. Returns `None`
    /// for anything else so callers can substitute a default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NONE" => Some(Intervention::None),
            "MIRROR" => Some(Intervention::Mirror),
            "COOLDOWN" => Some(Intervention::Cooldown),
            "PHRASE" => Some(Intervention::Phrase),
            _ => None,
        }
    }
}

/// Context multipliers applied before the Bayesian update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextFactors {
    pub late_night_multiplier: f64,
    pub website_risk_factor: f64,
    pub hour: u8,
    pub website: String,
}

/// Full diagnostic trace emitted by a single scoring call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringTrace {
    pub p_impulse: f64,
    pub dominant_trigger: String,
    pub z_scores: HashMap<String, f64>,
    pub likelihoods: HashMap<String, f64>,
    pub weighted_contributions: HashMap<String, f64>,
    pub context_factors: ContextFactors,
    pub intervention: Intervention,
    /// Supplementary human-readable explanation contrasting "Happy
    /// Excitement" vs "Impulsive Stress" indicators. Diagnostic only.
    pub narrative: String,
}

/// `late_night_multiplier(h)`: peaks at 1.5x at 3 AM, 1.0x outside [1,5].
fn late_night_multiplier(hour: u8) -> f64 {
    if (1..=5).contains(&hour) {
        1.0 + 0.5 * (1.0 - (hour as f64 - 3.0).abs() / 2.0)
    } else {
        1.0
    }
}

/// `website_risk_factor(host)`: case-insensitive substring match against a
/// closed keyword table.
fn website_risk_factor(website: &str) -> f64 {
    let host = website.to_lowercase();

    let gambling = ["casino", "bet", "poker", "gambling", "lottery"];
    if gambling.iter().any(|kw| host.contains(kw)) {
        return 2.0;
    }
    let flash_sale = ["flash", "limited time", "sale ends", "countdown"];
    if flash_sale.iter().any(|kw| host.contains(kw)) {
        return 2.0;
    }

    let large_retailers = ["amazon", "ebay", "temu", "shein", "aliexpress"];
    if large_retailers.iter().any(|kw| host.contains(kw)) {
        return 1.5;
    }

    let generic_retail = [
        "target",
        "walmart",
        "bestbuy",
        "costco",
        "wayfair",
        "macys",
        "kohls",
        "newegg",
        "zappos",
        "nike",
        "adidas",
        "homedepot",
        "lowes",
        "ikea",
        "etsy",
    ];
    if generic_retail.iter().any(|kw| host.contains(kw)) {
        return 1.0;
    }

    let edu = ["edu", "university", "school", "course", "learn", "nonprofit"];
    if edu.iter().any(|kw| host.contains(kw)) {
        return 0.5;
    }

    1.0
}

/// Per-feature likelihood from a z-score via the logistic sigmoid, clamped
/// to guarantee finiteness.
fn sigmoid_likelihood(z: f64) -> f64 {
    let raw = 1.0 / (1.0 + (-SIGMOID_K * z).exp());
    raw.clamp(LIKELIHOOD_MIN, LIKELIHOOD_MAX)
}

/// Time-to-cart likelihood: shorter TTC implies higher impulse likelihood.
fn ttc_likelihood(ttc: f64) -> f64 {
    if ttc <= 0.0 {
        1.0
    } else {
        1.0 - (ttc / 300.0).min(1.0)
    }
}

fn narrative(
    sample: &TelemetrySample,
    ctx: &ContextFactors,
    p_impulse: f64,
) -> String {
    let mut happy = Vec::new();
    let mut stress = Vec::new();

    let ttc = sample.effective_time_to_cart();
    if ttc > 300.0 {
        happy.push(format!("High TTC ({ttc:.1}s) suggests a planned purchase"));
    } else if ttc < 60.0 {
        stress.push(format!("Low TTC ({ttc:.1}s) indicates rapid decision-making"));
    }

    let arousal = sample.effective_arousal();
    if arousal < 0.4 {
        happy.push(format!("Low arousal ({arousal:.2}) suggests a calm state"));
    } else if arousal > 0.7 {
        stress.push(format!("High arousal ({arousal:.2}) indicates stress/excitement"));
    }

    if ctx.website_risk_factor >= 1.5 {
        stress.push(format!(
            "High-risk website (factor: {:.1}x)",
            ctx.website_risk_factor
        ));
    } else if ctx.website_risk_factor <= 0.5 {
        happy.push(format!(
            "Low-risk website (factor: {:.1}x)",
            ctx.website_risk_factor
        ));
    }

    let mut parts = vec![format!("p_impulse = {p_impulse:.3}")];
    if !happy.is_empty() {
        parts.push("Happy Excitement indicators:".to_string());
        parts.extend(happy.iter().map(|s| format!("  - {s}")));
    }
    if !stress.is_empty() {
        parts.push("Impulsive Stress indicators:".to_string());
        parts.extend(stress.iter().map(|s| format!("  - {s}")));
    }
    match stress.len().cmp(&happy.len()) {
        std::cmp::Ordering::Greater => parts.push("Assessment: IMPULSIVE STRESS".to_string()),
        std::cmp::Ordering::Less => parts.push("Assessment: HAPPY EXCITEMENT".to_string()),
        std::cmp::Ordering::Equal => {
            parts.push("Assessment: mixed signals, contextual factors decide".to_string())
        }
    }
    parts.join("\n")
}

/// Run the Fast Stage on a telemetry sample, producing a full trace.
///
/// Pure and side-effect-free: identical inputs always produce an identical
/// trace.
pub fn score(
    sample: &TelemetrySample,
    baselines: &Baselines,
    prior_p: f64,
    profile: WeightProfile,
) -> ScoringTrace {
    let weights = profile.weights();

    let z_scroll = baselines
        .scroll_velocity
        .z_score(sample.peak_scroll_velocity);
    let z_click = baselines.click_rate.z_score(sample.click_rate());
    let z_ttc = baselines
        .time_to_cart
        .z_score(sample.effective_time_to_cart());
    let z_hr = sample
        .heart_rate
        .map(|v| baselines.heart_rate.z_score(v))
        .unwrap_or(0.0);
    let z_rr = sample
        .respiration_rate
        .map(|v| baselines.respiration_rate.z_score(v))
        .unwrap_or(0.0);

    let l_scroll = sigmoid_likelihood(z_scroll);
    let l_click = sigmoid_likelihood(z_click);
    let l_ttc = ttc_likelihood(sample.effective_time_to_cart());
    let l_arousal = sample.effective_arousal().clamp(LIKELIHOOD_MIN, LIKELIHOOD_MAX);
    let l_hr = if sample.heart_rate.is_some() {
        sigmoid_likelihood(z_hr)
    } else {
        0.5
    };
    let l_rr = if sample.respiration_rate.is_some() {
        sigmoid_likelihood(z_rr)
    } else {
        0.5
    };

    // emotion_arousal has no baseline distribution to z-score against (its
    // likelihood is the raw arousal value, not a deviation from a mean), so
    // it's omitted here rather than recorded as a misleading 0.0.
    let mut z_scores = HashMap::new();
    z_scores.insert(Feature::ScrollVelocity.as_str().to_string(), z_scroll);
    z_scores.insert(Feature::ClickRate.as_str().to_string(), z_click);
    z_scores.insert(Feature::TimeToCart.as_str().to_string(), z_ttc);
    z_scores.insert(Feature::HeartRate.as_str().to_string(), z_hr);
    z_scores.insert(Feature::RespirationRate.as_str().to_string(), z_rr);

    let mut likelihoods = HashMap::new();
    likelihoods.insert(Feature::ScrollVelocity.as_str().to_string(), l_scroll);
    likelihoods.insert(Feature::ClickRate.as_str().to_string(), l_click);
    likelihoods.insert(Feature::TimeToCart.as_str().to_string(), l_ttc);
    likelihoods.insert(Feature::EmotionArousal.as_str().to_string(), l_arousal);
    likelihoods.insert(Feature::HeartRate.as_str().to_string(), l_hr);
    likelihoods.insert(Feature::RespirationRate.as_str().to_string(), l_rr);

    let contribution_of = |f: Feature| -> f64 {
        let (w, l) = match f {
            Feature::ScrollVelocity => (weights.scroll_velocity, l_scroll),
            Feature::ClickRate => (weights.click_rate, l_click),
            Feature::TimeToCart => (weights.time_to_cart, l_ttc),
            Feature::EmotionArousal => (weights.emotion_arousal, l_arousal),
            Feature::HeartRate => (weights.heart_rate, l_hr),
            Feature::RespirationRate => (weights.respiration_rate, l_rr),
        };
        w * l
    };

    let mut weighted_contributions = HashMap::new();
    let mut w_sum = 0.0;
    let mut dominant = Feature::ScrollVelocity;
    let mut dominant_value = f64::MIN;
    for f in Feature::ALL {
        let c = contribution_of(f);
        weighted_contributions.insert(f.as_str().to_string(), c);
        w_sum += c;
        if c > dominant_value {
            dominant_value = c;
            dominant = f;
        }
    }

    let late = late_night_multiplier(sample.system_hour);
    let risk = website_risk_factor(&sample.website);

    let adjusted_w = (w_sum * late * risk).clamp(0.0, 1.0);

    let denom = adjusted_w * prior_p + (1.0 - adjusted_w) * (1.0 - prior_p);
    let p_impulse = if denom == 0.0 {
        0.0
    } else {
        (adjusted_w * prior_p / denom).clamp(0.0, 1.0)
    };

    let context_factors = ContextFactors {
        late_night_multiplier: late,
        website_risk_factor: risk,
        hour: sample.system_hour,
        website: sample.website.clone(),
    };

    let narrative_text = narrative(sample, &context_factors, p_impulse);

    ScoringTrace {
        p_impulse,
        dominant_trigger: dominant.as_str().to_string(),
        z_scores,
        likelihoods,
        weighted_contributions,
        context_factors,
        intervention: Intervention::from_probability(p_impulse),
        narrative: narrative_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baselines::Baselines;

    fn sample(overrides: impl FnOnce(&mut TelemetrySample)) -> TelemetrySample {
        let mut s = TelemetrySample {
            time_to_cart: Some(180.0),
            time_on_site: 200.0,
            click_count: 5,
            peak_scroll_velocity: 100.0,
            system_hour: 14,
            product: "Wireless Mouse".to_string(),
            cost: 29.99,
            website: "bestbuy.com".to_string(),
            emotion_arousal: None,
            heart_rate: None,
            respiration_rate: None,
        };
        overrides(&mut s);
        s
    }

    #[test]
    fn neutral_daytime_is_low_risk() {
        let s = sample(|_| {});
        let trace = score(&s, &Baselines::default(), 0.2, WeightProfile::BehaviorOnly);
        assert!(trace.p_impulse < 0.3, "p={}", trace.p_impulse);
        assert_eq!(trace.intervention, Intervention::None);
    }

    #[test]
    fn late_night_gambling_spike_is_high_risk() {
        let s = sample(|s| {
            s.product = "Poker Chips".to_string();
            s.cost = 500.0;
            s.website = "online-casino.com".to_string();
            s.time_to_cart = Some(3.0);
            s.time_on_site = 30.0;
            s.click_count = 2;
            s.peak_scroll_velocity = 15000.0;
            s.system_hour = 3;
        });
        let trace = score(&s, &Baselines::default(), 0.2, WeightProfile::BehaviorOnly);
        assert!(trace.p_impulse > 0.5, "p={}", trace.p_impulse);
        assert!(matches!(
            trace.intervention,
            Intervention::Cooldown | Intervention::Phrase
        ));
    }

    #[test]
    fn late_night_multiplier_boundary() {
        assert!((late_night_multiplier(3) - 1.5).abs() < 1e-9);
        for h in 0..=23u8 {
            if !(1..=5).contains(&h) {
                assert_eq!(late_night_multiplier(h), 1.0);
            }
            let m = late_night_multiplier(h);
            assert!((1.0..=1.5).contains(&m));
        }
    }

    #[test]
    fn bounded_and_finite_for_extreme_inputs() {
        let s = sample(|s| {
            s.peak_scroll_velocity = f64::MAX / 4.0;
            s.click_count = u64::MAX / 2;
            s.time_on_site = 1.0;
            s.time_to_cart = Some(-999.0);
        });
        let trace = score(&s, &Baselines::default(), 0.2, WeightProfile::BehaviorOnly);
        assert!(trace.p_impulse.is_finite());
        assert!((0.0..=1.0).contains(&trace.p_impulse));
    }

    #[test]
    fn scroll_velocity_monotonic() {
        let baselines = Baselines::default();
        let low = sample(|s| s.peak_scroll_velocity = 100.0);
        let high = sample(|s| s.peak_scroll_velocity = 5000.0);
        let p_low = score(&low, &baselines, 0.2, WeightProfile::BehaviorOnly).p_impulse;
        let p_high = score(&high, &baselines, 0.2, WeightProfile::BehaviorOnly).p_impulse;
        assert!(p_high >= p_low);
    }

    #[test]
    fn lower_ttc_increases_or_holds_probability() {
        let baselines = Baselines::default();
        let slow = sample(|s| s.time_to_cart = Some(280.0));
        let fast = sample(|s| s.time_to_cart = Some(2.0));
        let p_slow = score(&slow, &baselines, 0.2, WeightProfile::BehaviorOnly).p_impulse;
        let p_fast = score(&fast, &baselines, 0.2, WeightProfile::BehaviorOnly).p_impulse;
        assert!(p_fast >= p_slow);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let s = sample(|_| {});
        let baselines = Baselines::default();
        let t1 = score(&s, &baselines, 0.2, WeightProfile::BehaviorOnly);
        let t2 = score(&s, &baselines, 0.2, WeightProfile::BehaviorOnly);
        assert_eq!(t1.p_impulse, t2.p_impulse);
        assert_eq!(t1.dominant_trigger, t2.dominant_trigger);
    }

    #[test]
    fn website_risk_table() {
        assert_eq!(website_risk_factor("www.online-casino.com"), 2.0);
        assert_eq!(website_risk_factor("shop.amazon.com"), 1.5);
        assert_eq!(website_risk_factor("bestbuy.com"), 1.0);
        assert_eq!(website_risk_factor("university.edu"), 0.5);
        assert_eq!(website_risk_factor("unknown-shop.io"), 1.0);
    }

    #[test]
    fn intervention_parses_case_insensitively() {
        assert_eq!(Intervention::parse("mirror"), Some(Intervention::Mirror));
        assert_eq!(Intervention::parse("BOGUS"), None);
    }
}
