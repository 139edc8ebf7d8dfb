//! Result types passed between pipeline stages.
//!
//! Every stage produces an explicit, tagged record. Generative output is
//! validated into these records before anything downstream reads it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Stage timings in milliseconds, keyed by measurement name (`gate_ms`, `llm_ms`, ...).
pub type Timings = BTreeMap<String, f64>;

/// Compliance classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    Unknown,
}

impl ComplianceVerdict {
    /// All verdicts, in declaration order.
    pub const ALL: [ComplianceVerdict; 4] = [
        ComplianceVerdict::Compliant,
        ComplianceVerdict::PartiallyCompliant,
        ComplianceVerdict::NonCompliant,
        ComplianceVerdict::Unknown,
    ];

    /// Wire name of the verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceVerdict::Compliant => "compliant",
            ComplianceVerdict::PartiallyCompliant => "partially_compliant",
            ComplianceVerdict::NonCompliant => "non_compliant",
            ComplianceVerdict::Unknown => "unknown",
        }
    }

    /// Severity rank used for risk mapping. `Unknown` and `NonCompliant` share the top rank.
    pub fn severity(&self) -> u8 {
        match self {
            ComplianceVerdict::Compliant => 0,
            ComplianceVerdict::PartiallyCompliant => 1,
            ComplianceVerdict::NonCompliant | ComplianceVerdict::Unknown => 2,
        }
    }
}

impl fmt::Display for ComplianceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliant" => Ok(ComplianceVerdict::Compliant),
            "partially_compliant" => Ok(ComplianceVerdict::PartiallyCompliant),
            "non_compliant" => Ok(ComplianceVerdict::NonCompliant),
            "unknown" => Ok(ComplianceVerdict::Unknown),
            other => Err(format!("invalid verdict '{}'", other)),
        }
    }
}

/// Status of a compliance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Ok,
    NeedsMoreContext,
    Error,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Ok => "ok",
            ComplianceStatus::NeedsMoreContext => "needs_more_context",
            ComplianceStatus::Error => "error",
        }
    }
}

/// Coarse risk flag carried by compliance results and trace entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// Risk flag for downstream stages that only see a confidence score.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.75 {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pointer from a verdict or answer back into the evidence set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,

    #[serde(default)]
    pub page: Option<u32>,

    /// Short verbatim hint of the cited passage
    #[serde(default)]
    pub quote_hint: String,
}

impl Citation {
    pub fn new(source: impl Into<String>, page: Option<u32>, quote_hint: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            quote_hint: quote_hint.into(),
        }
    }
}

/// Outcome of the compliance classification stage.
///
/// Invariant: `status != Ok` implies `verdict == Unknown` and `confidence == 0.0`.
/// Use the constructors on this type (or [`crate::verdict`]) rather than
/// building it field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    pub verdict: ComplianceVerdict,
    pub confidence: f64,
    pub rationale: String,
    pub policy_citations: Vec<Citation>,
    pub safety_flags: BTreeSet<String>,
    pub conflict_detected: bool,
    pub potential_conflict: bool,
    pub conflict_reason: String,
    pub violation_risk: RiskLevel,
    /// Always equal to `confidence`
    pub policy_alignment_score: f64,
    pub timings_ms: Timings,
}

impl ComplianceResult {
    /// Whether the classification produced a usable verdict.
    pub fn is_ok(&self) -> bool {
        self.status == ComplianceStatus::Ok
    }

    /// Whether any form of source conflict was reported.
    pub fn has_conflict(&self) -> bool {
        self.conflict_detected || self.potential_conflict
    }
}

/// Outcome of the reasoning stage.
///
/// `decision_path` is built without generative input and is the audit record;
/// `summary_reasoning` and `confidence_note` are advisory prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub summary_reasoning: String,
    pub decision_path: Vec<String>,
    pub confidence_note: String,
    pub timings_ms: Timings,
}

/// Final grounded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub action_items: Vec<String>,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_note: Option<String>,
    pub timings_ms: Timings,
}

impl AnswerResult {
    /// Equality that ignores timing fields.
    pub fn same_content(&self, other: &AnswerResult) -> bool {
        self.answer == other.answer
            && self.action_items == other.action_items
            && self.citations == other.citations
            && self.safety_note == other.safety_note
    }
}
