//! Compliance verdict resolution.
//!
//! The generative collaborator proposes a verdict; this module decides what
//! is actually recorded. Verdict normalization, confidence clamping and the
//! risk escalation rule are deterministic and override anything the model said.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::conflict::ConflictAssessment;
use crate::contract::{validate_output, OutputContract, SchemaError};
use crate::gate::GateDecision;
use crate::types::{
    Citation, ComplianceResult, ComplianceStatus, ComplianceVerdict, RiskLevel, Timings,
};

/// Flag appended when the model returned a verdict outside the allowed set.
pub const FLAG_INVALID_VERDICT: &str = "invalid_verdict_from_llm";

/// Flag appended when the model returned a non-numeric confidence.
pub const FLAG_INVALID_CONFIDENCE: &str = "invalid_confidence_from_llm";

/// Flag appended when classification could not be obtained at all.
pub const FLAG_CLASSIFICATION_FAILED: &str = "llm_classification_failed";

pub const INSUFFICIENT_EVIDENCE_RATIONALE: &str = "Policy confirmation restricted by legal/safety limits due to insufficient authoritative evidence.";

pub const CLASSIFICATION_FAILED_RATIONALE: &str = "Compliance classification could not be completed reliably, so no verdict was issued.";

/// Risk escalation rule.
///
/// High for any conflict signal or a non-compliant verdict, Medium for partial
/// compliance, Low otherwise.
pub fn resolve_violation_risk(
    verdict: ComplianceVerdict,
    conflict: &ConflictAssessment,
) -> RiskLevel {
    if conflict.confirmed || conflict.potential || verdict == ComplianceVerdict::NonCompliant {
        RiskLevel::High
    } else if verdict == ComplianceVerdict::PartiallyCompliant {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Validated classification fields extracted from generative output.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationDraft {
    pub verdict: ComplianceVerdict,
    pub confidence: f64,
    pub rationale: String,
    pub policy_citations: Vec<Citation>,
    pub safety_flags: BTreeSet<String>,
}

impl ClassificationDraft {
    /// Validate a parsed response against the compliance contract and coerce its values.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        validate_output(OutputContract::Compliance, value)?;

        let mut safety_flags: BTreeSet<String> = value["safety_flags"]
            .as_array()
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|f| f.as_str())
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let verdict = match value["verdict"].as_str() {
            None => ComplianceVerdict::Unknown,
            Some(raw) => match raw.trim().parse::<ComplianceVerdict>() {
                Ok(v) => v,
                Err(_) => {
                    safety_flags.insert(FLAG_INVALID_VERDICT.to_string());
                    ComplianceVerdict::Unknown
                }
            },
        };

        let confidence = match &value["confidence"] {
            Value::Null => 0.0,
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(c) if c.is_finite() => c,
                _ => {
                    safety_flags.insert(FLAG_INVALID_CONFIDENCE.to_string());
                    0.0
                }
            },
            _ => 0.0,
        };

        let rationale = value["rationale"]
            .as_str()
            .map(|r| r.trim().to_string())
            .unwrap_or_default();

        Ok(Self {
            verdict,
            confidence: clamp_confidence(confidence),
            rationale,
            policy_citations: citations_from_value(&value["policy_citations"]),
            safety_flags,
        })
    }
}

/// Clamp a confidence into `[0, 1]`; non-finite values become 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Read a list of `{source, page, quote_hint}` objects, skipping malformed entries.
pub fn citations_from_value(value: &Value) -> Vec<Citation> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let source = item["source"].as_str()?.trim();
            if source.is_empty() {
                return None;
            }
            let page = match &item["page"] {
                Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
                Value::String(s) => s.trim().parse::<u32>().ok(),
                _ => None,
            };
            let quote_hint = item["quote_hint"].as_str().unwrap_or_default().trim();
            Some(Citation::new(source, page, quote_hint))
        })
        .collect()
}

impl ComplianceResult {
    /// Short-circuit result for evidence that did not pass the gate.
    pub fn needs_more_context(
        gate: &GateDecision,
        conflict: &ConflictAssessment,
        timings_ms: Timings,
    ) -> Self {
        Self {
            status: ComplianceStatus::NeedsMoreContext,
            verdict: ComplianceVerdict::Unknown,
            confidence: 0.0,
            rationale: INSUFFICIENT_EVIDENCE_RATIONALE.to_string(),
            policy_citations: Vec::new(),
            safety_flags: gate.flags.clone(),
            // Untrusted evidence cannot confirm a conflict.
            conflict_detected: false,
            potential_conflict: conflict.potential,
            conflict_reason: conflict.reason.clone(),
            violation_risk: RiskLevel::High,
            policy_alignment_score: 0.0,
            timings_ms,
        }
    }

    /// Conservative result when the classification call failed or misbehaved.
    pub fn classification_failed(
        error_kind: &str,
        conflict: &ConflictAssessment,
        timings_ms: Timings,
    ) -> Self {
        let safety_flags = BTreeSet::from([
            FLAG_CLASSIFICATION_FAILED.to_string(),
            format!("classification_error:{}", error_kind),
        ]);

        Self {
            status: ComplianceStatus::Error,
            verdict: ComplianceVerdict::Unknown,
            confidence: 0.0,
            rationale: CLASSIFICATION_FAILED_RATIONALE.to_string(),
            policy_citations: Vec::new(),
            safety_flags,
            conflict_detected: conflict.confirmed,
            potential_conflict: conflict.potential,
            conflict_reason: conflict.reason.clone(),
            violation_risk: RiskLevel::High,
            policy_alignment_score: 0.0,
            timings_ms,
        }
    }

    /// Accepted classification with the deterministic risk rule applied.
    pub fn from_draft(
        draft: ClassificationDraft,
        gate_flags: &BTreeSet<String>,
        conflict: &ConflictAssessment,
        timings_ms: Timings,
    ) -> Self {
        let violation_risk = resolve_violation_risk(draft.verdict, conflict);
        let mut safety_flags = draft.safety_flags;
        safety_flags.extend(gate_flags.iter().cloned());

        Self {
            status: ComplianceStatus::Ok,
            verdict: draft.verdict,
            confidence: draft.confidence,
            rationale: draft.rationale,
            policy_citations: draft.policy_citations,
            safety_flags,
            conflict_detected: conflict.confirmed,
            potential_conflict: conflict.potential,
            conflict_reason: conflict.reason.clone(),
            violation_risk,
            policy_alignment_score: draft.confidence,
            timings_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::detect;
    use crate::evidence::EvidenceChunk;
    use crate::gate::EvidenceGate;
    use proptest::prelude::*;
    use serde_json::json;

    fn no_conflict() -> ConflictAssessment {
        ConflictAssessment::default()
    }

    #[test]
    fn test_risk_rule() {
        let confirmed = ConflictAssessment {
            confirmed: true,
            ..Default::default()
        };
        let potential = ConflictAssessment {
            potential: true,
            ..Default::default()
        };

        assert_eq!(resolve_violation_risk(ComplianceVerdict::Compliant, &confirmed), RiskLevel::High);
        assert_eq!(resolve_violation_risk(ComplianceVerdict::Compliant, &potential), RiskLevel::High);
        assert_eq!(resolve_violation_risk(ComplianceVerdict::NonCompliant, &no_conflict()), RiskLevel::High);
        assert_eq!(resolve_violation_risk(ComplianceVerdict::PartiallyCompliant, &no_conflict()), RiskLevel::Medium);
        assert_eq!(resolve_violation_risk(ComplianceVerdict::Compliant, &no_conflict()), RiskLevel::Low);
        assert_eq!(resolve_violation_risk(ComplianceVerdict::Unknown, &no_conflict()), RiskLevel::Low);
    }

    #[test]
    fn test_draft_coerces_invalid_verdict() {
        let draft = ClassificationDraft::from_value(&json!({
            "verdict": "probably_ok",
            "confidence": 0.8,
            "rationale": "  fine  "
        }))
        .unwrap();
        assert_eq!(draft.verdict, ComplianceVerdict::Unknown);
        assert!(draft.safety_flags.contains(FLAG_INVALID_VERDICT));
        assert_eq!(draft.rationale, "fine");
    }

    #[test]
    fn test_draft_missing_verdict_is_unknown_without_flag() {
        let draft = ClassificationDraft::from_value(&json!({"confidence": 0.4})).unwrap();
        assert_eq!(draft.verdict, ComplianceVerdict::Unknown);
        assert!(draft.safety_flags.is_empty());
    }

    #[test]
    fn test_draft_clamps_confidence() {
        let high = ClassificationDraft::from_value(&json!({"verdict": "compliant", "confidence": 1.7})).unwrap();
        assert_eq!(high.confidence, 1.0);

        let low = ClassificationDraft::from_value(&json!({"verdict": "compliant", "confidence": -3})).unwrap();
        assert_eq!(low.confidence, 0.0);

        let text = ClassificationDraft::from_value(&json!({"verdict": "compliant", "confidence": "0.65"})).unwrap();
        assert_eq!(text.confidence, 0.65);

        let junk = ClassificationDraft::from_value(&json!({"verdict": "compliant", "confidence": "high"})).unwrap();
        assert_eq!(junk.confidence, 0.0);
        assert!(junk.safety_flags.contains(FLAG_INVALID_CONFIDENCE));
    }

    #[test]
    fn test_draft_reads_citations_leniently() {
        let draft = ClassificationDraft::from_value(&json!({
            "verdict": "compliant",
            "policy_citations": [
                {"source": "a.txt", "page": 2, "quote_hint": "up to 10 days"},
                {"source": "b.txt", "page": "4"},
                {"page": 1, "quote_hint": "no source"},
                {"source": "  ", "quote_hint": "blank source"}
            ]
        }))
        .unwrap();
        assert_eq!(
            draft.policy_citations,
            vec![
                Citation::new("a.txt", Some(2), "up to 10 days"),
                Citation::new("b.txt", Some(4), ""),
            ]
        );
    }

    #[test]
    fn test_draft_rejects_wrong_shape() {
        assert!(ClassificationDraft::from_value(&json!("compliant")).is_err());
    }

    #[test]
    fn test_needs_more_context_invariants() {
        let gate = EvidenceGate::default().check(&[]);
        let result = ComplianceResult::needs_more_context(&gate, &no_conflict(), Timings::new());
        assert_eq!(result.status, ComplianceStatus::NeedsMoreContext);
        assert_eq!(result.verdict, ComplianceVerdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.violation_risk, RiskLevel::High);
        assert!(result.safety_flags.contains("no_retrieved_chunks"));
    }

    #[test]
    fn test_needs_more_context_never_confirms_conflict() {
        let chunks = [EvidenceChunk::new(0.9, "policy_a.txt", "Up to 10 days, or 15 with approval.")];
        let conflict = detect(&chunks);
        assert!(conflict.confirmed);

        let gate = EvidenceGate::default().check(&chunks);
        let result = ComplianceResult::needs_more_context(&gate, &conflict, Timings::new());
        assert!(!result.conflict_detected);
        assert!(!result.potential_conflict);
        assert!(!result.has_conflict());

        let potential = ConflictAssessment {
            potential: true,
            ..Default::default()
        };
        let result = ComplianceResult::needs_more_context(&gate, &potential, Timings::new());
        assert!(result.potential_conflict);
    }

    #[test]
    fn test_classification_failed_invariants() {
        let result = ComplianceResult::classification_failed("MalformedJson", &no_conflict(), Timings::new());
        assert_eq!(result.status, ComplianceStatus::Error);
        assert_eq!(result.verdict, ComplianceVerdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.safety_flags.contains("classification_error:MalformedJson"));
    }

    #[test]
    fn test_from_draft_mirrors_confidence_and_escalates_conflicts() {
        let chunks = vec![
            EvidenceChunk::new(0.9, "policy_a.txt", "10 days"),
            EvidenceChunk::new(0.8, "policy_b.txt", "15 days"),
        ];
        let conflict = detect(&chunks);
        let draft = ClassificationDraft::from_value(&json!({"verdict": "compliant", "confidence": 0.9})).unwrap();
        let result = ComplianceResult::from_draft(draft, &BTreeSet::new(), &conflict, Timings::new());

        assert!(result.conflict_detected);
        assert_eq!(result.violation_risk, RiskLevel::High);
        assert_eq!(result.policy_alignment_score, result.confidence);
    }

    proptest! {
        #[test]
        fn prop_clamped_confidence_in_range(c in proptest::num::f64::ANY) {
            let clamped = clamp_confidence(c);
            prop_assert!((0.0..=1.0).contains(&clamped));
        }

        #[test]
        fn prop_conflict_always_high_risk(idx in 0usize..4, potential in any::<bool>()) {
            let conflict = ConflictAssessment {
                confirmed: !potential,
                potential,
                ..Default::default()
            };
            let verdict = ComplianceVerdict::ALL[idx];
            prop_assert_eq!(resolve_violation_risk(verdict, &conflict), RiskLevel::High);
        }
    }
}
