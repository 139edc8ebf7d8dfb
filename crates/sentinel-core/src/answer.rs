//! Grounded answer assembly.
//!
//! The deterministic fallback is computed before any generation is attempted,
//! so every exit path of the answer stage has a well-formed result to return.

use serde_json::Value;

use crate::contract::{validate_output, OutputContract, SchemaError};
use crate::types::{AnswerResult, ComplianceResult, ComplianceVerdict, Timings};
use crate::verdict::citations_from_value;

/// Maximum lines kept from a generated answer.
pub const MAX_ANSWER_LINES: usize = 10;

pub const UNKNOWN_VERDICT_ANSWER: &str = "I found multiple Remote Work Policy documents, but they appear to represent different versions. Because Sentinel cannot confirm which version is authoritative, I can’t provide a single definitive interpretation yet.";

pub const SUPPORTED_ANSWER: &str =
    "Based on the retrieved policy context, here is the most supported answer.";

pub const UNKNOWN_VERDICT_ACTIONS: [&str; 3] = [
    "Confirm the authoritative policy version (e.g., latest effective date / official policy owner).",
    "If available, provide the approved policy repository link or policy hierarchy rule.",
    "Re-run the query after confirming which version applies to your business unit/region.",
];

pub const SUPPORTED_ANSWER_ACTION: &str =
    "Confirm any exceptions or approval workflow mentioned in the policy source.";

pub const GROUNDED_SAFETY_NOTE: &str =
    "This response is grounded only in the retrieved policy text.";

/// Action item that replaces all others when sources conflict.
pub const CONFLICT_ACTION_ITEM: &str =
    "Consult the authoritative policy owner to resolve conflicting or ambiguous requirements.";

/// Deterministic answer for a compliance result.
pub fn fallback_answer(compliance: &ComplianceResult, timings_ms: Timings) -> AnswerResult {
    let (answer, action_items) = if compliance.verdict == ComplianceVerdict::Unknown {
        (
            UNKNOWN_VERDICT_ANSWER,
            UNKNOWN_VERDICT_ACTIONS.iter().map(|a| a.to_string()).collect(),
        )
    } else {
        (SUPPORTED_ANSWER, vec![SUPPORTED_ANSWER_ACTION.to_string()])
    };

    AnswerResult {
        answer: answer.to_string(),
        action_items,
        citations: compliance.policy_citations.clone(),
        safety_note: Some(GROUNDED_SAFETY_NOTE.to_string()),
        timings_ms,
    }
}

/// Merge a generated response over the fallback.
///
/// The response must be an object with an `answer`; anything else is an error
/// and the caller returns the fallback verbatim. `action_items` and
/// `citations` that are missing or not lists are taken from the fallback.
pub fn merge_generated(value: &Value, fallback: &AnswerResult) -> Result<AnswerResult, SchemaError> {
    validate_output(OutputContract::Answer, value)?;

    let answer = truncate_lines(value["answer"].as_str().unwrap_or_default().trim(), MAX_ANSWER_LINES);
    if answer.is_empty() {
        return Err(SchemaError::Violation {
            contract: OutputContract::Answer.name(),
            errors: vec!["answer is blank".to_string()],
        });
    }

    let action_items = match value["action_items"].as_array() {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(str::to_string)
            .collect(),
        None => fallback.action_items.clone(),
    };

    let citations = if value["citations"].is_array() {
        citations_from_value(&value["citations"])
    } else {
        fallback.citations.clone()
    };

    let safety_note = value["safety_note"]
        .as_str()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(AnswerResult {
        answer,
        action_items,
        citations,
        safety_note,
        timings_ms: fallback.timings_ms.clone(),
    })
}

/// Keep at most `max_lines` lines of text.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    text.lines().take(max_lines).collect::<Vec<_>>().join("\n")
}

/// Replace the action items with the single conflict escalation item.
pub fn apply_conflict_override(answer: &mut AnswerResult) {
    answer.action_items = vec![CONFLICT_ACTION_ITEM.to_string()];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictAssessment;
    use crate::types::Citation;
    use crate::verdict::ClassificationDraft;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn compliance(verdict: &str, citations: Value) -> ComplianceResult {
        let draft = ClassificationDraft::from_value(&json!({
            "verdict": verdict,
            "confidence": 0.8,
            "policy_citations": citations,
        }))
        .unwrap();
        ComplianceResult::from_draft(draft, &BTreeSet::new(), &ConflictAssessment::default(), Timings::new())
    }

    #[test]
    fn test_unknown_verdict_fallback() {
        let fallback = fallback_answer(&compliance("unknown", json!([])), Timings::new());
        assert_eq!(fallback.answer, UNKNOWN_VERDICT_ANSWER);
        assert_eq!(fallback.action_items.len(), 3);
        assert_eq!(fallback.safety_note.as_deref(), Some(GROUNDED_SAFETY_NOTE));
    }

    #[test]
    fn test_supported_fallback_carries_compliance_citations() {
        let fallback = fallback_answer(
            &compliance("compliant", json!([{"source": "a.txt", "page": 1, "quote_hint": "q"}])),
            Timings::new(),
        );
        assert_eq!(fallback.answer, SUPPORTED_ANSWER);
        assert_eq!(fallback.action_items, vec![SUPPORTED_ANSWER_ACTION]);
        assert_eq!(fallback.citations, vec![Citation::new("a.txt", Some(1), "q")]);
    }

    #[test]
    fn test_merge_fills_missing_lists_from_fallback() {
        let fallback = fallback_answer(&compliance("unknown", json!([])), Timings::new());
        let merged = merge_generated(
            &json!({"answer": "Policies conflict.", "action_items": "ask HR", "safety_note": null}),
            &fallback,
        )
        .unwrap();
        assert_eq!(merged.answer, "Policies conflict.");
        assert_eq!(merged.action_items, fallback.action_items);
        assert_eq!(merged.citations, fallback.citations);
        assert_eq!(merged.safety_note, None);
    }

    #[test]
    fn test_merge_keeps_generated_lists() {
        let fallback = fallback_answer(&compliance("compliant", json!([])), Timings::new());
        let merged = merge_generated(
            &json!({
                "answer": "Yes, with approval.",
                "action_items": ["Ask your manager", 3, " "],
                "citations": [{"source": "b.txt", "page": "2", "quote_hint": "approval"}],
            }),
            &fallback,
        )
        .unwrap();
        assert_eq!(merged.action_items, vec!["Ask your manager"]);
        assert_eq!(merged.citations, vec![Citation::new("b.txt", Some(2), "approval")]);
    }

    #[test]
    fn test_merge_rejects_missing_answer() {
        let fallback = fallback_answer(&compliance("compliant", json!([])), Timings::new());
        assert!(merge_generated(&json!({"action_items": []}), &fallback).is_err());
        assert!(merge_generated(&json!(["answer"]), &fallback).is_err());
    }

    #[test]
    fn test_answer_truncated_to_ten_lines() {
        let long: Vec<String> = (1..=14).map(|i| format!("line {}", i)).collect();
        let fallback = fallback_answer(&compliance("compliant", json!([])), Timings::new());
        let merged = merge_generated(&json!({"answer": long.join("\n")}), &fallback).unwrap();
        assert_eq!(merged.answer.lines().count(), MAX_ANSWER_LINES);
        assert!(merged.answer.ends_with("line 10"));
    }

    #[test]
    fn test_conflict_override_replaces_actions() {
        let mut answer = fallback_answer(&compliance("unknown", json!([])), Timings::new());
        apply_conflict_override(&mut answer);
        assert_eq!(answer.action_items, vec![CONFLICT_ACTION_ITEM]);
    }
}
