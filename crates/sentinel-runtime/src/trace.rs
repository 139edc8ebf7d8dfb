//! Ordered, append-only execution trace for one pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use sentinel_core::RiskLevel;

/// Trace entry status for a stage that completed normally.
pub const STATUS_SUCCESS: &str = "success";

/// Trace entry status for a stage that returned its deterministic default.
pub const STATUS_FALLBACK: &str = "fallback";

/// One executed stage, as shown to auditors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTraceEntry {
    pub agent_name: String,

    /// 1-based position in the run
    pub execution_order: usize,

    pub status: String,
    pub latency_ms: u64,

    /// What the stage was given, in one line
    #[serde(default)]
    pub input_summary: String,

    pub decision_rationale: String,
    pub confidence_score: f64,
    pub risk_flag: RiskLevel,

    /// Stage-specific fields, serialized inline
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Value>,
}

impl PipelineTraceEntry {
    /// An entry with `execution_order` left for [`AgentTrace::push`] to assign.
    pub fn new(agent_name: impl Into<String>, status: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            agent_name: agent_name.into(),
            execution_order: 0,
            status: status.into(),
            latency_ms: latency_ms.max(0.0) as u64,
            input_summary: String::new(),
            decision_rationale: String::new(),
            confidence_score: 0.0,
            risk_flag: RiskLevel::Low,
            metrics: BTreeMap::new(),
        }
    }

    pub fn input(mut self, summary: impl Into<String>) -> Self {
        self.input_summary = summary.into();
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.decision_rationale = rationale.into();
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence;
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk_flag = risk;
        self
    }

    pub fn metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

/// Trace under construction. Entries are numbered in push order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentTrace {
    entries: Vec<PipelineTraceEntry>,
}

impl AgentTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut entry: PipelineTraceEntry) {
        entry.execution_order = self.entries.len() + 1;
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PipelineTraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<PipelineTraceEntry> {
        self.entries
    }
}
