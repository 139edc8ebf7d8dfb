//! Prompts for the generative stages.
//!
//! Each stage has one builder. The deterministic parts of a stage (gate,
//! conflicts, decision path) are computed before the prompt is built and are
//! passed in as facts; the model is only asked to phrase or classify.

use sentinel_core::evidence::{render_compact, render_verbatim};
use sentinel_core::{ComplianceResult, EvidenceChunk, ReasoningResult};

/// System message sent with every completion.
pub const SYSTEM_PROMPT: &str = "Return ONLY valid JSON.";

/// Compliance classification prompt over the verbatim evidence listing.
pub fn compliance_prompt(question: &str, chunks: &[EvidenceChunk]) -> String {
    format!(
        r#"You are Sentinel's Compliance Agent.
Classify the user's question using ONLY the provided policy evidence.

Return STRICT JSON with:
- verdict: compliant | partially_compliant | non_compliant | unknown
- confidence: 0.0-1.0
- rationale: concise, business-safe explanation
- policy_citations: [{{source, page, quote_hint}}]
- safety_flags: []

User question:
{question}

Policy evidence:
{evidence}

Rules:
- Never invent policy
- If evidence is insufficient or conflicting, verdict MUST be 'unknown'
- quote_hint must be copied verbatim (<=12 words)
"#,
        question = question,
        evidence = render_verbatim(chunks),
    )
}

/// Reasoning prompt. The decision path is fixed; the model only explains it.
pub fn reasoning_prompt(question: &str, compliance: &ComplianceResult, decision_path: &[String]) -> String {
    let steps = serde_json::to_string_pretty(decision_path).unwrap_or_default();

    format!(
        r#"You are Sentinel's Reasoning Agent.

Explain the compliance outcome clearly and conservatively.

Question:
{question}

Compliance verdict:
{verdict}

Decision path:
{steps}

Return ONLY valid JSON with:
summary_reasoning (string)
confidence_note (string)
"#,
        question = question,
        verdict = compliance.verdict,
        steps = steps,
    )
}

/// Final answer prompt over the compacted evidence listing.
pub fn answer_prompt(
    question: &str,
    compliance: &ComplianceResult,
    reasoning: &ReasoningResult,
    chunks: &[EvidenceChunk],
) -> String {
    let flags = serde_json::to_string_pretty(&compliance.safety_flags).unwrap_or_default();
    let citations = serde_json::to_string_pretty(&compliance.policy_citations).unwrap_or_default();

    format!(
        r#"You are Sentinel. Generate a final answer grounded ONLY in the provided context.

User question:
{question}

Compliance verdict:
{verdict}

Compliance rationale:
{rationale}

Reasoning summary:
{summary}

Flags:
{flags}

Citations (hints):
{citations}

Retrieved Context (the ONLY allowed evidence):
{context}

Return ONLY valid JSON with:
answer (string, concise, enterprise tone)
action_items (array of strings)
citations (array of objects: source, page, quote_hint)
safety_note (string, optional)

Rules:
- If verdict is "unknown": be conservative, say policy versions conflict/are ambiguous, suggest how to confirm authoritative version.
- Do NOT invent policy details not explicitly present in context.
- Keep answer <= 10 lines.
"#,
        question = question,
        verdict = compliance.verdict,
        rationale = compliance.rationale,
        summary = reasoning.summary_reasoning,
        flags = flags,
        citations = citations,
        context = render_compact(chunks),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{ConflictAssessment, EvidenceGate, Synthesizer, Timings};

    fn chunks() -> Vec<EvidenceChunk> {
        vec![
            EvidenceChunk::new(0.91, "remote_work_v1.txt", "Remote work\nrequires approval.").with_page(1),
            EvidenceChunk::new(0.80, "remote_work_v2.txt", "x".repeat(1200)),
        ]
    }

    fn unknown_result(chunks: &[EvidenceChunk]) -> ComplianceResult {
        let gate = EvidenceGate::new(5, 0.55).check(chunks);
        ComplianceResult::needs_more_context(&gate, &ConflictAssessment::default(), Timings::new())
    }

    #[test]
    fn test_compliance_prompt_lists_evidence_verbatim() {
        let prompt = compliance_prompt("Can I work remotely?", &chunks());
        assert!(prompt.starts_with("You are Sentinel's Compliance Agent."));
        assert!(prompt.contains("[1] score=0.91 source=remote_work_v1.txt page=1 evidence=Remote work requires approval."));
        assert!(prompt.contains("[2] score=0.8 source=remote_work_v2.txt page=None"));
        assert!(prompt.contains("verdict MUST be 'unknown'"));
        assert!(prompt.contains("policy_citations: [{source, page, quote_hint}]"));
    }

    #[test]
    fn test_reasoning_prompt_carries_decision_path() {
        let chunks = chunks();
        let compliance = unknown_result(&chunks);
        let path = Synthesizer::new().decision_path(&compliance, &chunks);
        let prompt = reasoning_prompt("Can I work remotely?", &compliance, &path);

        assert!(prompt.contains("Compliance verdict:\nunknown"));
        assert!(prompt.contains("\"System avoided assumptions beyond available evidence\""));
    }

    #[test]
    fn test_answer_prompt_compacts_long_chunks() {
        let chunks = chunks();
        let compliance = unknown_result(&chunks);
        let reasoning = Synthesizer::new().fallback(Vec::new(), Timings::new());
        let prompt = answer_prompt("Can I work remotely?", &compliance, &reasoning, &chunks);

        let expected = format!("text={}...", "x".repeat(900));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains(&"x".repeat(901)));
        assert!(prompt.contains("insufficient_chunks<5"));
        assert!(prompt.contains("Keep answer <= 10 lines."));
    }
}
