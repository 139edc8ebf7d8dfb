//! Answer generation stage.

use std::sync::Arc;
use std::time::Instant;

use sentinel_core::{
    fallback_answer, merge_generated, parse_json_object, AnswerResult, ComplianceResult, EvidenceChunk,
    ReasoningResult, Timings,
};

use super::{elapsed_ms, StageKind, StageLlm};
use crate::config::{ConfigError, RuntimeConfig};
use crate::evidence::CitationValidator;
use crate::prompts::answer_prompt;
use crate::providers::LlmProvider;
use crate::resilience::{fallible_with_default, BudgetTracker, Guarded};

/// Produces the final grounded answer.
///
/// The deterministic answer is computed before the call and returned
/// verbatim whenever the response is unusable.
#[derive(Debug, Clone)]
pub struct AnswerAgent {
    llm: StageLlm,
}

impl AnswerAgent {
    pub fn new(llm: StageLlm) -> Self {
        Self { llm }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(StageLlm::new(
            StageKind::Answer,
            provider,
            config.completion_config(StageKind::Answer),
        )))
    }

    pub async fn generate(
        &self,
        question: &str,
        compliance: &ComplianceResult,
        reasoning: &ReasoningResult,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> AnswerResult {
        self.run(question, compliance, reasoning, chunks, budget)
            .await
            .into_value()
    }

    pub async fn run(
        &self,
        question: &str,
        compliance: &ComplianceResult,
        reasoning: &ReasoningResult,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> Guarded<AnswerResult> {
        let t0 = Instant::now();
        let fallback = fallback_answer(compliance, Timings::new());
        let prompt = answer_prompt(question, compliance, reasoning, chunks);

        let mut guarded = fallible_with_default(
            StageKind::Answer,
            self.llm.invoke(prompt, budget),
            |raw| {
                let parsed = parse_json_object(raw)?;
                let mut answer = merge_generated(&parsed.value, &fallback)?;
                let grounded = CitationValidator::new(chunks).retain_grounded(answer.citations);
                if !grounded.dropped.is_empty() {
                    tracing::warn!(dropped = grounded.dropped.len(), "Removed ungrounded answer citations");
                }
                answer.citations = grounded.kept;
                Ok(answer)
            },
            |_| fallback.clone(),
        )
        .await;

        guarded
            .value
            .timings_ms
            .insert("total_ms".to_string(), elapsed_ms(t0));
        guarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, ProviderError, ScriptedProvider, ScriptedReply};
    use sentinel_core::answer::{UNKNOWN_VERDICT_ACTIONS, UNKNOWN_VERDICT_ANSWER};
    use sentinel_core::{Citation, ConflictAssessment, EvidenceGate, Synthesizer};

    fn agent(provider: ScriptedProvider) -> AnswerAgent {
        AnswerAgent::new(StageLlm::new(
            StageKind::Answer,
            Arc::new(provider),
            CompletionConfig::new("test-model", 700),
        ))
    }

    fn unknown_inputs() -> (ComplianceResult, ReasoningResult, Vec<EvidenceChunk>) {
        let chunks = vec![
            EvidenceChunk::new(0.9, "remote_work_v1.txt", "Remote work up to 10 days.").with_page(1),
            EvidenceChunk::new(0.8, "remote_work_v2.txt", "Remote work up to 15 days.").with_page(1),
        ];
        let gate = EvidenceGate::new(3, 0.55).check(&chunks);
        let compliance = ComplianceResult::needs_more_context(&gate, &ConflictAssessment::default(), Timings::new());
        let reasoning = Synthesizer::new().fallback(Vec::new(), Timings::new());
        (compliance, reasoning, chunks)
    }

    #[tokio::test]
    async fn test_malformed_response_returns_unknown_fallback() {
        let (compliance, reasoning, chunks) = unknown_inputs();
        let answer = agent(ScriptedProvider::with_contents(["I think the answer is yes"]))
            .generate("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000))
            .await;

        assert_eq!(answer.answer, UNKNOWN_VERDICT_ANSWER);
        assert_eq!(answer.action_items, UNKNOWN_VERDICT_ACTIONS.map(String::from).to_vec());
        assert!(answer.timings_ms.contains_key("total_ms"));
    }

    #[tokio::test]
    async fn test_missing_fields_come_from_fallback() {
        let (compliance, reasoning, chunks) = unknown_inputs();
        let answer = agent(ScriptedProvider::with_contents([
            r#"{"answer": "Two versions conflict.", "action_items": "confirm"}"#,
        ]))
        .generate("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000))
        .await;

        assert_eq!(answer.answer, "Two versions conflict.");
        assert_eq!(answer.action_items.len(), 3);
        assert!(answer.safety_note.is_none());
    }

    #[tokio::test]
    async fn test_ungrounded_answer_citations_removed() {
        let (compliance, reasoning, chunks) = unknown_inputs();
        let answer = agent(ScriptedProvider::with_contents([r#"{
            "answer": "See policy.",
            "action_items": [],
            "citations": [
                {"source": "remote_work_v2.txt", "page": 1, "quote_hint": "up to 15 days"},
                {"source": "made_up.pdf", "page": 4, "quote_hint": "anything"}
            ]
        }"#]))
        .generate("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000))
        .await;

        assert_eq!(answer.citations, vec![Citation::new("remote_work_v2.txt", Some(1), "up to 15 days")]);
    }

    #[tokio::test]
    async fn test_idempotent_for_identical_inputs() {
        let (compliance, reasoning, chunks) = unknown_inputs();
        let agent = agent(ScriptedProvider::repeating(r#"{"answer": "Same.", "action_items": ["a"]}"#));

        let first = agent.generate("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000)).await;
        let second = agent.generate("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000)).await;
        assert!(first.same_content(&second));
    }

    #[tokio::test]
    async fn test_provider_failure_returns_fallback() {
        let (compliance, reasoning, chunks) = unknown_inputs();
        let guarded = agent(ScriptedProvider::new([ScriptedReply::Failure(ProviderError::RateLimited {
            retry_after: None,
        })]))
        .run("q", &compliance, &reasoning, &chunks, &BudgetTracker::new(4000))
        .await;

        assert!(guarded.fell_back());
        assert!(guarded.value.same_content(&fallback_answer(&compliance, Timings::new())));
    }
}
