//! Reasoner (component E): builds the purchase-analysis prompt, invokes the
//! LLM Gateway, and validates/clamps the returned verdict.
//!
//! The system instruction is a fixed goal-alignment rubric; prompt assembly
//! and post-call coercion turn a loosely-typed model response into a
//! [`Verdict`] that's safe to serve even when the model returns partial or
//! oddly-typed JSON.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ImpulseError, Result};
use crate::llm::{LlmGateway, LlmRequest};
use crate::memory::ContextSnippet;
use crate::scoring::{Intervention, ScoringTrace};
use crate::telemetry::TelemetrySample;

/// The persona and rubric applied to every purchase-analysis call. The
/// Gateway contract only requires that the *same* instruction is reused
/// call to call; the rubric's content is a product decision.
pub const SYSTEM_INSTRUCTION: &str = "\
You are the user's deliberate executive function: a context-aware reasoning \
system that evaluates a purchase on genuine utility, not on the Fast Brain's \
score alone.

Before adjusting the score, classify the purchase's utility:
- STRONG utility (replaces something broken/worn, addresses a stated need or \
  goal): reduce the score significantly.
- MODERATE utility (a quality upgrade, a seasonal necessity, an established \
  hobby): reduce the score moderately.
- WEAK/NO utility (a duplicate, a flash-sale trigger, pure status or \
  entertainment): do not reduce the score, or increase it.

Then weigh, in order: goal alignment against Goals.md, budget constraints \
against Budget.md, impulse indicators (sale language, late night, very fast \
time-to-cart), and established behavioral patterns from Behavior.md.

Respond with JSON only, matching exactly:
{\"impulse_score\": <float 0-1>, \"confidence\": <float 0-1>, \"reasoning\": \
\"<1-2 sentences, citing goals/budget when relevant>\", \"intervention_action\": \
\"<NONE|MIRROR|COOLDOWN|PHRASE>\", \"memory_update\": <string or null>}";

/// System instruction used for memory-file consolidation calls, kept
/// separate from [`SYSTEM_INSTRUCTION`] since consolidation rewrites a
/// whole file rather than producing a purchase verdict.
pub const CONSOLIDATION_SYSTEM_INSTRUCTION: &str = "\
You are a memory consolidation system. Merge the new observation into the \
current file, deduplicating similar entries and keeping at most 5-7 \
observations per section. Preserve the markdown structure and section \
headers. Do not keep per-observation timestamps.

Respond with JSON only: {\"refined_content\": \"<complete markdown file>\"}";

/// Validated reasoning verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub impulse_score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub intervention_action: Intervention,
    pub memory_update: Option<String>,
}

/// Raw, untrusted shape of the LLM's JSON response, deserialized
/// permissively so every field can be independently coerced to a sane
/// default rather than failing the whole response.
#[derive(Debug, Default, Deserialize)]
struct RawVerdict {
    impulse_score: Option<serde_json::Value>,
    confidence: Option<serde_json::Value>,
    reasoning: Option<String>,
    intervention_action: Option<String>,
    memory_update: Option<serde_json::Value>,
}

const FALLBACK_REASONING: &str = "Unable to generate reasoning.";

pub struct Reasoner<'a> {
    gateway: &'a LlmGateway,
}

impl<'a> Reasoner<'a> {
    pub fn new(gateway: &'a LlmGateway) -> Self {
        Self { gateway }
    }

    /// Run the Slow Stage: build the prompt, call the Gateway, validate.
    /// Never returns an error — any Gateway failure becomes a degraded
    /// verdict that echoes the fast score instead.
    pub async fn analyze(
        &self,
        fast_trace: &ScoringTrace,
        sample: &TelemetrySample,
        snippets: &[ContextSnippet],
    ) -> Verdict {
        if !self.gateway.is_configured() {
            return degraded_verdict(fast_trace, "no LLM credentials configured");
        }

        let prompt = build_prompt(fast_trace, sample, snippets);
        let request = LlmRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            prompt,
        };

        match self.gateway.call(&request).await {
            Ok(value) => validate_verdict(value, fast_trace.p_impulse),
            Err(e) => {
                warn!(error = %e, "reasoner call failed, falling back to fast score");
                degraded_verdict(fast_trace, &e.to_string())
            }
        }
    }
}

fn build_prompt(
    fast_trace: &ScoringTrace,
    sample: &TelemetrySample,
    snippets: &[ContextSnippet],
) -> String {
    let time_label = if sample.is_late_night() {
        "LATE NIGHT (11 PM - 5 AM)"
    } else {
        "Normal hours"
    };

    let mut telemetry_summary = String::new();
    telemetry_summary.push_str(&format!(
        "- Time to Cart: {:.1}s\n",
        sample.effective_time_to_cart()
    ));
    telemetry_summary.push_str(&format!("- Time on Site: {:.1}s\n", sample.time_on_site));
    telemetry_summary.push_str(&format!("- Click Rate: {:.2} clicks/sec\n", sample.click_rate()));
    telemetry_summary.push_str(&format!(
        "- Peak Scroll Velocity: {:.1} px/s\n",
        sample.peak_scroll_velocity
    ));
    telemetry_summary.push_str(&format!("- Total Clicks: {}\n", sample.click_count));

    let context_text = if snippets.is_empty() {
        "No memory files found - proceed with caution.".to_string()
    } else {
        snippets
            .iter()
            .map(|s| format!("From {} ({}):\n{}", s.file, s.section, s.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "## Fast Brain Assessment\n\
         - Initial Impulse Score: {p_fast:.3}\n\n\
         ## Purchase Details\n\
         - Product: {product}\n\
         - Cost: ${cost:.2}\n\
         - Website: {website}\n\
         - Time: {hour}:00 ({time_label})\n\n\
         ## Behavioral Telemetry\n\
         {telemetry_summary}\n\
         ## User Memory Context\n\n\
         {context_text}\n\n\
         ## Analysis Request\n\
         1. Evaluate utility, goal alignment, and budget fit.\n\
         2. Consider behavioral patterns and time of day.\n\
         3. Calculate the final score starting from {p_fast:.3}.\n\
         4. Select an intervention from NONE/MIRROR/COOLDOWN/PHRASE.\n\
         5. Set memory_update only if a genuinely new pattern emerges, else null.\n\n\
         Respond with JSON only, using exactly the keys impulse_score, confidence, \
         reasoning, intervention_action, memory_update.",
        p_fast = fast_trace.p_impulse,
        product = sample.product,
        cost = sample.cost,
        website = sample.website,
        hour = sample.system_hour,
        time_label = time_label,
        telemetry_summary = telemetry_summary,
        context_text = context_text,
    )
}

fn validate_verdict(raw_value: serde_json::Value, fallback_score: f64) -> Verdict {
    let raw: RawVerdict = serde_json::from_value(raw_value).unwrap_or_default();

    let impulse_score = raw
        .impulse_score
        .and_then(|v| v.as_f64())
        .unwrap_or(fallback_score)
        .clamp(0.0, 1.0);

    let confidence = raw
        .confidence
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let reasoning = raw
        .reasoning
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_REASONING.to_string());

    let intervention_action = raw
        .intervention_action
        .as_deref()
        .and_then(Intervention::parse)
        .unwrap_or(Intervention::None);

    let memory_update = raw.memory_update.and_then(|v| match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    });

    Verdict {
        impulse_score,
        confidence,
        reasoning,
        intervention_action,
        memory_update,
    }
}

fn degraded_verdict(fast_trace: &ScoringTrace, reason: &str) -> Verdict {
    Verdict {
        impulse_score: fast_trace.p_impulse,
        confidence: 0.3,
        reasoning: format!("Fast Brain analysis only (LLM unavailable: {reason})"),
        intervention_action: fast_trace.intervention,
        memory_update: None,
    }
}

/// Ask the LLM to return `{refined_content}` for a memory file, used by the
/// Memory Mutator's LLM-refine path. Returns `Ok(None)` when the call fails
/// or the response has no usable content, letting the caller fall back to a
/// simple append.
pub async fn refine_memory(
    gateway: &LlmGateway,
    current_content: &str,
    new_observation: &str,
) -> Result<Option<String>> {
    if !gateway.is_configured() {
        return Ok(None);
    }

    let prompt = format!(
        "CURRENT FILE CONTENT:\n{current_content}\n\n\
         NEW OBSERVATION TO INTEGRATE:\n{new_observation}\n\n\
         Consolidate, keeping at most 5-7 observations per section."
    );
    let request = LlmRequest {
        system_instruction: CONSOLIDATION_SYSTEM_INSTRUCTION.to_string(),
        prompt,
    };

    let value = match gateway.call(&request).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "memory refinement call failed");
            return Ok(None);
        }
    };

    let refined = value
        .get("refined_content")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match refined {
        Some(content) if !content.trim().is_empty() => Ok(Some(content)),
        _ => Err(ImpulseError::other("refinement response had no usable content")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baselines::Baselines;
    use crate::scoring::weights::WeightProfile;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            time_to_cart: Some(30.0),
            time_on_site: 60.0,
            click_count: 6,
            peak_scroll_velocity: 500.0,
            system_hour: 14,
            product: "Widget".to_string(),
            cost: 19.99,
            website: "example.com".to_string(),
            emotion_arousal: None,
            heart_rate: None,
            respiration_rate: None,
        }
    }

    fn trace() -> ScoringTrace {
        crate::scoring::score(&sample(), &Baselines::default(), 0.2, WeightProfile::BehaviorOnly)
    }

    #[test]
    fn validate_clamps_out_of_range_scores() {
        let raw = serde_json::json!({
            "impulse_score": 1.7,
            "confidence": -0.2,
            "reasoning": "too eager",
            "intervention_action": "mirror",
            "memory_update": null
        });
        let v = validate_verdict(raw, 0.1);
        assert_eq!(v.impulse_score, 1.0);
        assert_eq!(v.confidence, 0.0);
        assert_eq!(v.intervention_action, Intervention::Mirror);
    }

    #[test]
    fn validate_substitutes_defaults_on_missing_fields() {
        let raw = serde_json::json!({});
        let v = validate_verdict(raw, 0.42);
        assert_eq!(v.impulse_score, 0.42);
        assert_eq!(v.confidence, 0.5);
        assert_eq!(v.reasoning, FALLBACK_REASONING);
        assert_eq!(v.intervention_action, Intervention::None);
        assert_eq!(v.memory_update, None);
    }

    #[test]
    fn validate_normalizes_unknown_intervention_to_none() {
        let raw = serde_json::json!({"intervention_action": "BOGUS"});
        let v = validate_verdict(raw, 0.1);
        assert_eq!(v.intervention_action, Intervention::None);
    }

    #[test]
    fn validate_treats_blank_memory_update_as_null() {
        let raw = serde_json::json!({"memory_update": "   "});
        let v = validate_verdict(raw, 0.1);
        assert_eq!(v.memory_update, None);
    }

    #[test]
    fn validate_trims_memory_update() {
        let raw = serde_json::json!({"memory_update": "  buys shoes at night  "});
        let v = validate_verdict(raw, 0.1);
        assert_eq!(v.memory_update.as_deref(), Some("buys shoes at night"));
    }

    #[test]
    fn degraded_verdict_echoes_fast_score() {
        let t = trace();
        let v = degraded_verdict(&t, "outage");
        assert_eq!(v.impulse_score, t.p_impulse);
        assert_eq!(v.confidence, 0.3);
        assert_eq!(v.intervention_action, t.intervention);
        assert!(v.memory_update.is_none());
        assert!(v.reasoning.contains("outage"));
    }

    #[test]
    fn prompt_includes_late_night_label() {
        let mut s = sample();
        s.system_hour = 2;
        let t = crate::scoring::score(&s, &Baselines::default(), 0.2, WeightProfile::BehaviorOnly);
        let prompt = build_prompt(&t, &s, &[]);
        assert!(prompt.contains("LATE NIGHT"));
    }

    #[test]
    fn prompt_labels_snippets_with_file_and_section() {
        let snippets = vec![ContextSnippet {
            content: "saving for a car".to_string(),
            file: "Goals.md".to_string(),
            section: "Savings Targets".to_string(),
            source: crate::memory::SnippetSource::DirectRead,
        }];
        let prompt = build_prompt(&trace(), &sample(), &snippets);
        assert!(prompt.contains("From Goals.md (Savings Targets)"));
    }
}
