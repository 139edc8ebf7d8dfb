//! Compliance classification stage.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use sentinel_core::{
    detect, parse_json_object, ClassificationDraft, ComplianceResult, ConflictAssessment,
    EvidenceChunk, EvidenceGate, GateDecision, Timings,
};

use super::{elapsed_ms, AgentError, StageKind, StageLlm};
use crate::config::{ConfigError, RuntimeConfig};
use crate::evidence::CitationValidator;
use crate::prompts::compliance_prompt;
use crate::providers::LlmProvider;
use crate::resilience::{fallible_with_default, BudgetTracker, Guarded};

/// Flag recorded when a generated citation did not point at retrieved evidence.
pub const FLAG_UNGROUNDED_CITATION: &str = "ungrounded_citation_dropped";

/// Flag recorded when a kept citation's quote hint was not found in its chunk.
pub const FLAG_UNVERIFIED_QUOTE: &str = "unverified_quote_hint";

/// Classifies a question against gated evidence.
///
/// The gate runs first and short-circuits without a generative call. The
/// risk rule is applied to whatever the model returns.
#[derive(Debug, Clone)]
pub struct ComplianceAgent {
    llm: StageLlm,
    gate: EvidenceGate,
}

impl ComplianceAgent {
    pub fn new(llm: StageLlm, gate: EvidenceGate) -> Self {
        Self { llm, gate }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            StageLlm::new(StageKind::Compliance, provider, config.completion_config(StageKind::Compliance)),
            config.evidence_gate(),
        ))
    }

    pub fn gate(&self) -> &EvidenceGate {
        &self.gate
    }

    /// Classify, never failing. See [`ComplianceAgent::run`].
    pub async fn classify(
        &self,
        question: &str,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> ComplianceResult {
        let gate = self.gate.check(chunks);
        let conflict = detect(chunks);
        self.run(question, chunks, &gate, &conflict, budget).await.into_value()
    }

    /// Classify over precomputed gate and conflict results.
    ///
    /// A failed generation yields `status=error` with
    /// `llm_classification_failed`; the failure reason is kept on the
    /// returned [`Guarded`].
    pub async fn run(
        &self,
        question: &str,
        chunks: &[EvidenceChunk],
        gate: &GateDecision,
        conflict: &ConflictAssessment,
        budget: &BudgetTracker,
    ) -> Guarded<ComplianceResult> {
        let t0 = Instant::now();
        if !gate.ok {
            return Guarded::accepted(self.short_circuit(gate, conflict, t0));
        }

        let prompt = compliance_prompt(question, chunks);
        let t1 = Instant::now();

        fallible_with_default(
            StageKind::Compliance,
            self.llm.invoke(prompt, budget),
            |raw| self.accept(raw, chunks, &gate.flags, conflict, timings(t0, Some(t1))),
            |err| ComplianceResult::classification_failed(err.kind(), conflict, timings(t0, Some(t1))),
        )
        .await
    }

    /// Classify, returning the generation failure instead of the safe result.
    pub async fn try_classify(
        &self,
        question: &str,
        chunks: &[EvidenceChunk],
        budget: &BudgetTracker,
    ) -> Result<ComplianceResult, AgentError> {
        let t0 = Instant::now();
        let gate = self.gate.check(chunks);
        let conflict = detect(chunks);
        if !gate.ok {
            return Ok(self.short_circuit(&gate, &conflict, t0));
        }

        let t1 = Instant::now();
        let raw = self.llm.invoke(compliance_prompt(question, chunks), budget).await?;
        self.accept(&raw, chunks, &gate.flags, &conflict, timings(t0, Some(t1)))
    }

    fn short_circuit(&self, gate: &GateDecision, conflict: &ConflictAssessment, t0: Instant) -> ComplianceResult {
        tracing::info!(reason = ?gate.reason, flags = ?gate.flags, "Evidence gate failed, skipping classification");
        ComplianceResult::needs_more_context(gate, conflict, timings(t0, None))
    }

    fn accept(
        &self,
        raw: &str,
        chunks: &[EvidenceChunk],
        gate_flags: &BTreeSet<String>,
        conflict: &ConflictAssessment,
        timings_ms: Timings,
    ) -> Result<ComplianceResult, AgentError> {
        let parsed = parse_json_object(raw)?;
        let mut draft = ClassificationDraft::from_value(&parsed.value)?;

        let grounded = CitationValidator::new(chunks).retain_grounded(std::mem::take(&mut draft.policy_citations));
        if !grounded.dropped.is_empty() {
            draft.safety_flags.insert(FLAG_UNGROUNDED_CITATION.to_string());
        }
        if grounded.unverified_quotes > 0 {
            draft.safety_flags.insert(FLAG_UNVERIFIED_QUOTE.to_string());
        }
        draft.policy_citations = grounded.kept;

        Ok(ComplianceResult::from_draft(draft, gate_flags, conflict, timings_ms))
    }
}

/// `gate_ms`, `llm_ms` and `total_ms`; `llm_start` is absent when no call was made.
fn timings(t0: Instant, llm_start: Option<Instant>) -> Timings {
    let total = elapsed_ms(t0);
    let (gate_ms, llm_ms) = match llm_start {
        Some(t1) => (t1.duration_since(t0).as_secs_f64() * 1000.0, elapsed_ms(t1)),
        None => (total, 0.0),
    };

    Timings::from([
        ("gate_ms".to_string(), gate_ms),
        ("llm_ms".to_string(), llm_ms),
        ("total_ms".to_string(), total),
    ])
}
