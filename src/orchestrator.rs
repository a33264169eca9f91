//! Pipeline Orchestrator (component G): wires telemetry through the
//! Scoring Kernel, Memory Store/Vector Index, Reasoner, and Memory Mutator
//! into a single purchase-analysis response.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::baselines::Baselines;
use crate::config::Config;
use crate::cost_tracker::{CostTracker, TokenUsage};
use crate::llm::LlmGateway;
use crate::memory::MemoryStore;
use crate::mutator::MemoryMutator;
use crate::reasoner::Reasoner;
use crate::scoring::{self, Intervention};
use crate::telemetry::TelemetrySample;
use crate::vector_index::VectorIndex;

const RETRIEVAL_N_RESULTS: usize = 3;

/// Full purchase-analysis response returned by the primary endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseAnalysis {
    pub p_impulse_fast: f64,
    pub fast_brain_intervention: Intervention,
    pub fast_brain_dominant_trigger: String,
    pub impulse_score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub intervention_action: Intervention,
    pub memory_update: Option<String>,
}

pub struct Orchestrator<'a> {
    baselines: Baselines,
    prior_p: f64,
    weight_profile: crate::scoring::weights::WeightProfile,
    refinement_threshold: usize,
    memory: &'a MemoryStore,
    index: &'a dyn VectorIndex,
    gateway: &'a LlmGateway,
    cost_tracker: Option<&'a CostTracker>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &Config,
        baselines: Baselines,
        memory: &'a MemoryStore,
        index: &'a dyn VectorIndex,
        gateway: &'a LlmGateway,
    ) -> Self {
        Self {
            baselines,
            prior_p: config.prior_p,
            weight_profile: config.weight_profile,
            refinement_threshold: config.refinement_threshold,
            memory,
            index,
            gateway,
            cost_tracker: None,
        }
    }

    /// Attach a cost tracker so every reasoning call's estimated token
    /// usage is logged against the daily/monthly LLM budget.
    pub fn with_cost_tracker(mut self, cost_tracker: &'a CostTracker) -> Self {
        self.cost_tracker = Some(cost_tracker);
        self
    }

    /// Run the full pipeline for one purchase event: score, retrieve,
    /// reason, mutate. The complete fallback for a failure upstream of
    /// all of that is handled by the caller wrapping this in
    /// [`Orchestrator::analyze_with_fallback`].
    pub async fn analyze(&self, sample: &TelemetrySample) -> PurchaseAnalysis {
        let fast_trace = scoring::score(sample, &self.baselines, self.prior_p, self.weight_profile);

        let query = sample.retrieval_query();
        let snippets = self
            .memory
            .retrieve_context(&query, self.index, RETRIEVAL_N_RESULTS)
            .await;

        let reasoner = Reasoner::new(self.gateway);
        let verdict = reasoner.analyze(&fast_trace, sample, &snippets).await;

        if self.gateway.is_configured() {
            if let Some(tracker) = self.cost_tracker {
                let input_chars = query.len() + snippets.iter().map(|s| s.content.len()).sum::<usize>();
                let usage = TokenUsage::estimate(input_chars, verdict.reasoning.len());
                tracker.log_call("analyze", usage);
            }
        }

        if let Some(update) = &verdict.memory_update {
            let mutator = MemoryMutator::new(
                self.memory,
                self.index,
                self.gateway,
                self.refinement_threshold,
            );
            let outcome = mutator.apply(update).await;
            info!(?outcome, "applied memory mutation from purchase analysis");
        }

        PurchaseAnalysis {
            p_impulse_fast: fast_trace.p_impulse,
            fast_brain_intervention: fast_trace.intervention,
            fast_brain_dominant_trigger: fast_trace.dominant_trigger,
            impulse_score: verdict.impulse_score,
            confidence: verdict.confidence,
            reasoning: verdict.reasoning,
            intervention_action: verdict.intervention_action,
            memory_update: verdict.memory_update,
        }
    }

    /// Entry point the HTTP handler calls: never fails. Every inner
    /// component already degrades to a documented fallback on its own
    /// errors (the Reasoner on Gateway failure, the Mutator on write
    /// failure); this wrapper exists so a future catastrophic failure
    /// introduced upstream of those components still has a single place to
    /// land on a safe, well-formed complete fallback.
    pub async fn analyze_with_fallback(&self, sample: &TelemetrySample) -> PurchaseAnalysis {
        if let Err(reason) = sample.validate() {
            error!(reason, "telemetry failed validation inside orchestrator, returning complete fallback");
            return complete_fallback();
        }
        self.analyze(sample).await
    }
}

fn complete_fallback() -> PurchaseAnalysis {
    PurchaseAnalysis {
        p_impulse_fast: 0.5,
        fast_brain_intervention: Intervention::Mirror,
        fast_brain_dominant_trigger: "error".to_string(),
        impulse_score: 0.5,
        confidence: 0.3,
        reasoning: "Pipeline failure; returning safe fallback.".to_string(),
        intervention_action: Intervention::Mirror,
        memory_update: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmGateway;
    use crate::memory::MemoryStore;
    use crate::vector_index::InMemoryIndex;
    use std::time::Duration;

    fn sample() -> TelemetrySample {
        TelemetrySample {
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
        }
    }

    fn config(memory_dir: &std::path::Path) -> Config {
        Config {
            memory_dir: memory_dir.to_path_buf(),
            llm_credentials_path: None,
            prior_p: 0.2,
            weight_profile: crate::scoring::weights::WeightProfile::BehaviorOnly,
            refinement_threshold: 7,
            consolidation_size_threshold: 2048,
            consolidation_observation_threshold: 10,
            vector_index_dir: memory_dir.join(".vector-index"),
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            request_timeout_secs: 90,
            llm_model: "gemini-1.5-pro".to_string(),
            llm_base_url: "https://example.invalid/v1".to_string(),
        }
    }

    #[tokio::test]
    async fn degraded_pipeline_echoes_fast_score_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryStore::new(dir.path());
        memory.ensure_initialized().unwrap();
        let index = InMemoryIndex::new();
        let gateway = LlmGateway::new(
            "https://example.invalid/v1",
            "gemini-1.5-pro",
            None,
            Duration::from_secs(30),
        )
        .unwrap();
        let cfg = config(dir.path());

        let orchestrator = Orchestrator::new(&cfg, Baselines::default(), &memory, &index, &gateway);
        let response = orchestrator.analyze_with_fallback(&sample()).await;

        assert_eq!(response.impulse_score, response.p_impulse_fast);
        assert_eq!(response.confidence, 0.3);
        assert!(response.memory_update.is_none());
        assert_eq!(response.intervention_action, response.fast_brain_intervention);
    }
}
