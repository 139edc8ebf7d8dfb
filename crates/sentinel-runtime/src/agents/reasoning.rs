//! Reasoning synthesis stage.

use std::sync::Arc;
use std::time::Instant;

use sentinel_core::{parse_json_object, ComplianceResult, EvidenceChunk, ReasoningResult, Synthesizer, Timings};

use super::{elapsed_ms, StageKind, StageLlm};
use crate::config::{ConfigError, RuntimeConfig};
use crate::prompts::reasoning_prompt;
use crate::providers::LlmProvider;
use crate::resilience::{fallible_with_default, BudgetTracker, Guarded};

/// Explains a compliance outcome.
///
/// The decision path is built before any generative call and is never taken
/// from the model. Only the summary and confidence note are generated.
#[derive(Debug, Clone)]
pub struct ReasoningAgent {
    llm: StageLlm,
    synthesizer: Synthesizer,
}

impl ReasoningAgent {
    pub fn new(llm: StageLlm) -> Self {
        Self {
            llm,
            synthesizer: Synthesizer::new(),
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(StageLlm::new(
            StageKind::Reasoning,
            provider,
            config.completion_config(StageKind::Reasoning),
        )))
    }

    pub async fn synthesize(
        &self,
        question: &str,
        compliance: &ComplianceResult,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> ReasoningResult {
        self.run(question, compliance, chunks, budget).await.into_value()
    }

    pub async fn run(
        &self,
        question: &str,
        compliance: &ComplianceResult,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> Guarded<ReasoningResult> {
        let t0 = Instant::now();
        let decision_path = self.synthesizer.decision_path(compliance, chunks);
        let prompt = reasoning_prompt(question, compliance, &decision_path);

        fallible_with_default(
            StageKind::Reasoning,
            self.llm.invoke(prompt, budget),
            |raw| {
                let parsed = parse_json_object(raw)?;
                Ok(self
                    .synthesizer
                    .from_generated(&parsed.value, decision_path.clone(), total(t0))?)
            },
            |_| self.synthesizer.fallback(decision_path.clone(), total(t0)),
        )
        .await
    }
}

fn total(t0: Instant) -> Timings {
    Timings::from([("total_ms".to_string(), elapsed_ms(t0))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, ScriptedProvider, ScriptedReply};
    use sentinel_core::synthesizer::{FALLBACK_CONFIDENCE_NOTE, FALLBACK_SUMMARY};
    use sentinel_core::{ConflictAssessment, EvidenceGate};
    use std::time::Duration;

    fn agent(provider: ScriptedProvider) -> ReasoningAgent {
        let mut config = CompletionConfig::new("test-model", 350);
        config.timeout = Duration::from_secs(2);
        ReasoningAgent::new(StageLlm::new(StageKind::Reasoning, Arc::new(provider), config))
    }

    fn inputs() -> (ComplianceResult, Vec<EvidenceChunk>) {
        let chunks = vec![
            EvidenceChunk::new(0.4, "remote_work_v1.txt", "a"),
            EvidenceChunk::new(0.3, "remote_work_v2.txt", "b"),
        ];
        let gate = EvidenceGate::default().check(&chunks);
        let compliance = ComplianceResult::needs_more_context(&gate, &ConflictAssessment::default(), Timings::new());
        (compliance, chunks)
    }

    #[tokio::test]
    async fn test_generated_prose_keeps_fixed_path() {
        let provider = ScriptedProvider::with_contents([r#"{
            "summary_reasoning": "Two versions exist.",
            "confidence_note": "Moderate.",
            "decision_path": ["model supplied step"]
        }"#]);
        let (compliance, chunks) = inputs();

        let guarded = agent(provider)
            .run("q", &compliance, &chunks, &BudgetTracker::new(4000))
            .await;

        assert!(!guarded.fell_back());
        let result = guarded.value;
        assert_eq!(result.summary_reasoning, "Two versions exist.");
        assert_eq!(result.decision_path, Synthesizer::new().decision_path(&compliance, &chunks));
        assert!(result.timings_ms.contains_key("total_ms"));
    }

    #[tokio::test]
    async fn test_empty_response_uses_safe_narrative() {
        let (compliance, chunks) = inputs();
        let result = agent(ScriptedProvider::with_contents([""]))
            .synthesize("q", &compliance, &chunks, &BudgetTracker::new(4000))
            .await;

        assert_eq!(result.summary_reasoning, FALLBACK_SUMMARY);
        assert_eq!(result.confidence_note, FALLBACK_CONFIDENCE_NOTE);
        assert_eq!(result.decision_path.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_safe_narrative() {
        let provider = ScriptedProvider::new([ScriptedReply::Delayed {
            after: Duration::from_secs(60),
            content: r#"{"summary_reasoning": "late"}"#.into(),
        }]);
        let (compliance, chunks) = inputs();

        let guarded = agent(provider)
            .run("q", &compliance, &chunks, &BudgetTracker::new(4000))
            .await;

        assert_eq!(guarded.value.summary_reasoning, FALLBACK_SUMMARY);
        assert!(guarded.fallback_reason.unwrap().starts_with("Timeout: "));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_falls_back_without_calling() {
        let provider = Arc::new(ScriptedProvider::repeating(r#"{"summary_reasoning": "x"}"#));
        let agent = ReasoningAgent::new(StageLlm::new(
            StageKind::Reasoning,
            provider.clone(),
            CompletionConfig::new("test-model", 350),
        ));
        let (compliance, chunks) = inputs();

        let guarded = agent.run("q", &compliance, &chunks, &BudgetTracker::new(10)).await;
        assert!(guarded.fallback_reason.unwrap().starts_with("BudgetExceeded: "));
        assert_eq!(provider.call_count(), 0);
    }
}
