//! Token budget and usage accounting for one pipeline invocation.
//!
//! A tracker is created per request and dropped with it; nothing here is
//! shared between invocations.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::agents::StageKind;
use crate::providers::TokenUsage;

/// Token allowance with atomic accounting.
pub struct TokenBudget {
    pub max_tokens: u32,
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated generative usage for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,

    /// Total tokens per stage name
    pub tokens_by_stage: BTreeMap<String, u32>,
}

impl LlmUsage {
    pub fn add(&mut self, stage: StageKind, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        *self
            .tokens_by_stage
            .entry(stage.as_str().to_string())
            .or_default() += usage.total();
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-nano") => (0.1, 0.4),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("gpt-4.1") => (2.0, 8.0),
            m if m.contains("gpt-3.5") => (0.5, 1.5),
            _ => (0.15, 0.6),
        };

        (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate
            + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
    }
}

/// Budget plus usage for one invocation.
pub struct BudgetTracker {
    budget: TokenBudget,
    usage: RwLock<LlmUsage>,
}

impl BudgetTracker {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            budget: TokenBudget::new(max_tokens),
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    pub fn can_afford(&self, estimated_tokens: u32) -> bool {
        self.budget.can_afford(estimated_tokens)
    }

    pub fn remaining(&self) -> u32 {
        self.budget.remaining()
    }

    pub fn record_usage(&self, stage: StageKind, usage: &TokenUsage, model: &str) {
        self.budget.record(usage.total());
        self.usage.write().add(stage, usage, model);
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }
}

impl std::fmt::Debug for BudgetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetTracker")
            .field("max_tokens", &self.budget.max_tokens)
            .field("used", &self.budget.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    #[test]
    fn test_budget_enforcement() {
        let budget = TokenBudget::new(100);
        assert!(budget.can_afford(100));
        assert!(!budget.can_afford(101));

        budget.record(60);
        assert_eq!(budget.remaining(), 40);
        assert!(!budget.can_afford(50));

        budget.record(100);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_tracker_accumulates_per_stage() {
        let tracker = BudgetTracker::new(4000);
        tracker.record_usage(StageKind::Compliance, &usage(300, 100), "gpt-4o-mini");
        tracker.record_usage(StageKind::Answer, &usage(500, 200), "gpt-4o-mini");

        let total = tracker.usage();
        assert_eq!(total.llm_calls, 2);
        assert_eq!(total.total_tokens, 1100);
        assert_eq!(total.tokens_by_stage["compliance"], 400);
        assert_eq!(tracker.remaining(), 2900);
    }

    #[test]
    fn test_cost_estimation() {
        let mut total = LlmUsage::default();
        total.add(StageKind::Compliance, &usage(1_000_000, 0), "gpt-4o-2024-08-06");
        assert!((total.estimated_cost - 2.5).abs() < 1e-9);

        let mut mini = LlmUsage::default();
        mini.add(StageKind::Compliance, &usage(0, 1_000_000), "gpt-4o-mini");
        assert!((mini.estimated_cost - 0.6).abs() < 1e-9);
    }
}
