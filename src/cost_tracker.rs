//! Tracks LLM API usage and cost against a daily/monthly budget.
//!
//! Backed by an in-process log rather than a database: this crate has no
//! persistence layer, and durable cost history across restarts is out of
//! scope.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Gemini 1.5 Pro list pricing (USD per million tokens) used to estimate
/// spend; this is an estimate; the provider's billing is authoritative.
const COST_PER_MILLION_INPUT: f64 = 1.25;
const COST_PER_MILLION_OUTPUT: f64 = 5.00;

const DEFAULT_DAILY_BUDGET_USD: f64 = 5.0;
const DEFAULT_MONTHLY_BUDGET_USD: f64 = 100.0;

/// Token counts for a single LLM call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Rough token estimate from character count (~4 chars/token), used
    /// because the Gemini REST response this gateway parses does not
    /// always include a `usageMetadata` block.
    pub fn estimate(prompt_chars: usize, response_chars: usize) -> Self {
        Self {
            input_tokens: (prompt_chars as f64 / 4.0).ceil() as u64,
            output_tokens: (response_chars as f64 / 4.0).ceil() as u64,
        }
    }
}

#[derive(Debug, Clone)]
struct CostEntry {
    timestamp: DateTime<Utc>,
    operation: String,
    usage: TokenUsage,
    cost_usd: f64,
}

/// Cost statistics for a time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStats {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
}

/// Budget status for the current day and month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub daily_spend_usd: f64,
    pub daily_budget_usd: f64,
    pub daily_percent_used: f64,
    pub monthly_spend_usd: f64,
    pub monthly_budget_usd: f64,
    pub monthly_percent_used: f64,
    pub alerts: Vec<String>,
}

/// In-process tracker of LLM call cost, used to populate the health
/// endpoint's budget fields and to warn when spend approaches a limit.
pub struct CostTracker {
    entries: RwLock<Vec<CostEntry>>,
    daily_budget_usd: f64,
    monthly_budget_usd: f64,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    pub fn new() -> Self {
        Self::with_budgets(DEFAULT_DAILY_BUDGET_USD, DEFAULT_MONTHLY_BUDGET_USD)
    }

    pub fn with_budgets(daily_budget_usd: f64, monthly_budget_usd: f64) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            daily_budget_usd,
            monthly_budget_usd,
        }
    }

    /// Record one LLM call's usage and return its estimated cost.
    pub fn log_call(&self, operation: &str, usage: TokenUsage) -> f64 {
        let cost = Self::calculate_cost(usage);
        let entry = CostEntry {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            usage,
            cost_usd: cost,
        };

        match self.entries.write() {
            Ok(mut entries) => entries.push(entry),
            Err(_) => warn!("cost tracker lock poisoned, dropping usage record"),
        }

        if let Some(alert) = self.budget_status().alerts.into_iter().next() {
            warn!(operation, "{}", alert);
        }

        cost
    }

    fn calculate_cost(usage: TokenUsage) -> f64 {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * COST_PER_MILLION_INPUT;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * COST_PER_MILLION_OUTPUT;
        input_cost + output_cost
    }

    fn stats_since(&self, since: DateTime<Utc>) -> CostStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = CostStats {
            total_calls: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: 0.0,
        };
        for entry in entries.iter().filter(|e| e.timestamp >= since) {
            stats.total_calls += 1;
            stats.total_input_tokens += entry.usage.input_tokens;
            stats.total_output_tokens += entry.usage.output_tokens;
            stats.total_cost_usd += entry.cost_usd;
        }
        stats
    }

    pub fn daily_stats(&self) -> CostStats {
        self.stats_since(Utc::now() - Duration::days(1))
    }

    pub fn monthly_stats(&self) -> CostStats {
        self.stats_since(Utc::now() - Duration::days(30))
    }

    /// Total calls logged across the tracker's lifetime, surfaced on the
    /// health endpoint.
    pub fn total_calls(&self) -> u64 {
        self.entries
            .read()
            .map(|e| e.len() as u64)
            .unwrap_or(0)
    }

    pub fn budget_status(&self) -> BudgetStatus {
        let daily = self.daily_stats();
        let monthly = self.monthly_stats();

        let daily_percent = (daily.total_cost_usd / self.daily_budget_usd) * 100.0;
        let monthly_percent = (monthly.total_cost_usd / self.monthly_budget_usd) * 100.0;

        let mut alerts = Vec::new();
        if daily_percent >= 100.0 {
            alerts.push(format!(
                "daily LLM budget exceeded: ${:.2} / ${:.2}",
                daily.total_cost_usd, self.daily_budget_usd
            ));
        } else if daily_percent >= 80.0 {
            alerts.push(format!(
                "daily LLM budget at {:.0}%: ${:.2} / ${:.2}",
                daily_percent, daily.total_cost_usd, self.daily_budget_usd
            ));
        }
        if monthly_percent >= 100.0 {
            alerts.push(format!(
                "monthly LLM budget exceeded: ${:.2} / ${:.2}",
                monthly.total_cost_usd, self.monthly_budget_usd
            ));
        } else if monthly_percent >= 80.0 {
            alerts.push(format!(
                "monthly LLM budget at {:.0}%: ${:.2} / ${:.2}",
                monthly_percent, monthly.total_cost_usd, self.monthly_budget_usd
            ));
        }

        BudgetStatus {
            daily_spend_usd: daily.total_cost_usd,
            daily_budget_usd: self.daily_budget_usd,
            daily_percent_used: daily_percent,
            monthly_spend_usd: monthly.total_cost_usd,
            monthly_budget_usd: self.monthly_budget_usd,
            monthly_percent_used: monthly_percent,
            alerts,
        }
    }

    /// Cost breakdown by operation name, for diagnostics.
    pub fn cost_by_operation(&self) -> Vec<(String, f64)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut totals: Vec<(String, f64)> = Vec::new();
        for entry in entries.iter() {
            match totals.iter_mut().find(|(op, _)| op == &entry.operation) {
                Some((_, cost)) => *cost += entry.cost_usd,
                None => totals.push((entry.operation.clone(), entry.cost_usd)),
            }
        }
        totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_calculation_matches_pricing_table() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
        };
        let cost = CostTracker::calculate_cost(usage);
        assert!((cost - (COST_PER_MILLION_INPUT + COST_PER_MILLION_OUTPUT)).abs() < 1e-9);
    }

    #[test]
    fn log_call_accumulates_daily_stats() {
        let tracker = CostTracker::new();
        tracker.log_call("analyze", TokenUsage { input_tokens: 1000, output_tokens: 500 });
        tracker.log_call("analyze", TokenUsage { input_tokens: 2000, output_tokens: 1000 });

        let stats = tracker.daily_stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_input_tokens, 3000);
        assert!(stats.total_cost_usd > 0.0);
    }

    #[test]
    fn budget_alert_fires_past_threshold() {
        let tracker = CostTracker::with_budgets(0.001, 1.0);
        tracker.log_call("analyze", TokenUsage { input_tokens: 1_000_000, output_tokens: 1_000_000 });
        let status = tracker.budget_status();
        assert!(!status.alerts.is_empty());
        assert!(status.daily_percent_used >= 100.0);
    }

    #[test]
    fn estimate_scales_with_char_count() {
        let usage = TokenUsage::estimate(4000, 400);
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.output_tokens, 100);
    }

    #[test]
    fn cost_by_operation_sums_per_operation() {
        let tracker = CostTracker::new();
        tracker.log_call("analyze", TokenUsage { input_tokens: 1000, output_tokens: 0 });
        tracker.log_call("consolidate", TokenUsage { input_tokens: 2000, output_tokens: 0 });
        tracker.log_call("analyze", TokenUsage { input_tokens: 1000, output_tokens: 0 });

        let breakdown = tracker.cost_by_operation();
        assert_eq!(breakdown.len(), 2);
        let analyze_cost = breakdown.iter().find(|(op, _)| op == "analyze").unwrap().1;
        let consolidate_cost = breakdown.iter().find(|(op, _)| op == "consolidate").unwrap().1;
        assert!((analyze_cost - consolidate_cost).abs() < 1e-9);
    }
}
