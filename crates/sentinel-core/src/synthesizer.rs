//! Reasoning synthesizer: the deterministic decision path.
//!
//! The decision path is the audit record and is built only from the compliance
//! result and the evidence set. Generated prose may phrase a summary of it but
//! never changes it:
//! 1. The verdict is always stated first
//! 2. Multiple chunks, then multiple sources, are noted when present
//! 3. An unknown verdict records that no precedence could be determined
//! 4. The closing restraint step is always last

use serde_json::Value;

use crate::contract::{validate_output, OutputContract, SchemaError};
use crate::evidence::{distinct_sources, EvidenceChunk};
use crate::types::{ComplianceResult, ComplianceVerdict, ReasoningResult, Timings};

pub const STEP_MULTIPLE_DOCUMENTS: &str = "Multiple policy documents were retrieved";
pub const STEP_MULTIPLE_SOURCES: &str = "Policies originated from different source files";
pub const STEP_NO_PRECEDENCE: &str = "No authoritative policy precedence could be determined";
pub const STEP_AVOIDED_ASSUMPTIONS: &str = "System avoided assumptions beyond available evidence";

pub const FALLBACK_SUMMARY: &str = "The system identified ambiguity across multiple policy documents and therefore avoided issuing a definitive interpretation.";
pub const FALLBACK_CONFIDENCE_NOTE: &str = "High confidence in ambiguity due to conflicting evidence.";

/// Builds decision paths and assembles reasoning results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Ordered decision steps for a compliance result over an evidence set.
    pub fn decision_path(
        &self,
        compliance: &ComplianceResult,
        chunks: &[EvidenceChunk],
    ) -> Vec<String> {
        let mut steps = vec![format!("Compliance verdict was '{}'", compliance.verdict)];

        if chunks.len() > 1 {
            steps.push(STEP_MULTIPLE_DOCUMENTS.to_string());
        }

        if distinct_sources(chunks).len() > 1 {
            steps.push(STEP_MULTIPLE_SOURCES.to_string());
        }

        if compliance.verdict == ComplianceVerdict::Unknown {
            steps.push(STEP_NO_PRECEDENCE.to_string());
        }

        steps.push(STEP_AVOIDED_ASSUMPTIONS.to_string());
        steps
    }

    /// Safe narrative used whenever generated prose is unavailable.
    pub fn fallback(&self, decision_path: Vec<String>, timings_ms: Timings) -> ReasoningResult {
        ReasoningResult {
            summary_reasoning: FALLBACK_SUMMARY.to_string(),
            decision_path,
            confidence_note: FALLBACK_CONFIDENCE_NOTE.to_string(),
            timings_ms,
        }
    }

    /// Accept generated prose around a fixed decision path.
    ///
    /// The response must satisfy the reasoning contract; the decision path is
    /// taken from the caller, never from the response.
    pub fn from_generated(
        &self,
        value: &Value,
        decision_path: Vec<String>,
        timings_ms: Timings,
    ) -> Result<ReasoningResult, SchemaError> {
        validate_output(OutputContract::Reasoning, value)?;

        let summary = value["summary_reasoning"].as_str().unwrap_or_default().trim();
        if summary.is_empty() {
            return Err(SchemaError::Violation {
                contract: OutputContract::Reasoning.name(),
                errors: vec!["summary_reasoning is blank".to_string()],
            });
        }

        let confidence_note = value["confidence_note"]
            .as_str()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_CONFIDENCE_NOTE);

        Ok(ReasoningResult {
            summary_reasoning: summary.to_string(),
            decision_path,
            confidence_note: confidence_note.to_string(),
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictAssessment;
    use crate::gate::EvidenceGate;
    use crate::verdict::ClassificationDraft;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn compliance(verdict: &str) -> ComplianceResult {
        let draft = ClassificationDraft::from_value(&json!({"verdict": verdict, "confidence": 0.8})).unwrap();
        ComplianceResult::from_draft(draft, &BTreeSet::new(), &ConflictAssessment::default(), Timings::new())
    }

    fn chunk(source: &str) -> EvidenceChunk {
        EvidenceChunk::new(0.8, source, "Remote work requires approval.")
    }

    #[test]
    fn test_full_decision_path_for_unknown_verdict() {
        let steps = Synthesizer::new().decision_path(
            &compliance("unknown"),
            &[chunk("policy_a.txt"), chunk("policy_b.txt")],
        );
        assert_eq!(
            steps,
            vec![
                "Compliance verdict was 'unknown'",
                STEP_MULTIPLE_DOCUMENTS,
                STEP_MULTIPLE_SOURCES,
                STEP_NO_PRECEDENCE,
                STEP_AVOIDED_ASSUMPTIONS,
            ]
        );
    }

    #[test]
    fn test_single_source_compliant_path() {
        let steps = Synthesizer::new().decision_path(
            &compliance("compliant"),
            &[chunk("remote_work_v1.txt"), chunk("remote_work_v1.txt")],
        );
        assert_eq!(
            steps,
            vec![
                "Compliance verdict was 'compliant'",
                STEP_MULTIPLE_DOCUMENTS,
                STEP_AVOIDED_ASSUMPTIONS,
            ]
        );
    }

    #[test]
    fn test_gated_result_path_with_no_chunks() {
        let gate = EvidenceGate::default().check(&[]);
        let result = ComplianceResult::needs_more_context(&gate, &ConflictAssessment::default(), Timings::new());
        let steps = Synthesizer::new().decision_path(&result, &[]);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], STEP_NO_PRECEDENCE);
    }

    #[test]
    fn test_generated_prose_keeps_decision_path() {
        let synth = Synthesizer::new();
        let path = vec!["fixed".to_string()];
        let result = synth
            .from_generated(
                &json!({"summary_reasoning": " All clear. ", "decision_path": ["rewritten"]}),
                path.clone(),
                Timings::new(),
            )
            .unwrap();
        assert_eq!(result.decision_path, path);
        assert_eq!(result.summary_reasoning, "All clear.");
        assert_eq!(result.confidence_note, FALLBACK_CONFIDENCE_NOTE);
    }

    #[test]
    fn test_generated_prose_rejects_blank_summary() {
        let synth = Synthesizer::new();
        assert!(synth
            .from_generated(&json!({"summary_reasoning": "   "}), vec![], Timings::new())
            .is_err());
        assert!(synth
            .from_generated(&json!({"confidence_note": "x"}), vec![], Timings::new())
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_path_is_bracketed(
            verdict_idx in 0usize..4,
            sources in proptest::collection::vec("[a-c]\\.txt", 0..6),
        ) {
            let verdict = ComplianceVerdict::ALL[verdict_idx];
            let chunks: Vec<EvidenceChunk> = sources.iter().map(|s| chunk(s)).collect();
            let steps = Synthesizer::new().decision_path(&compliance(verdict.as_str()), &chunks);

            prop_assert_eq!(&steps[0], &format!("Compliance verdict was '{}'", verdict));
            prop_assert_eq!(steps.last().map(String::as_str), Some(STEP_AVOIDED_ASSUMPTIONS));
            prop_assert!(steps.len() >= 2 && steps.len() <= 5);
        }
    }
}
