//! Pipeline orchestrator.
//!
//! The orchestrator runs one question through the pipeline:
//! - Retrieval through the injected [`Retriever`]
//! - Evidence gate and conflict detection (deterministic)
//! - Compliance, reasoning and answer stages (generative, each with a fallback)
//! - Assembly of the final result, trace, usage and timings
//!
//! Stages run strictly in sequence. Nothing escapes [`PipelineOrchestrator::process`]:
//! errors, deadline expiry and panics all become `status=error`.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use sentinel_core::evidence::{source_diversity, top_score};
use sentinel_core::{
    apply_conflict_override, detect, AnswerResult, Citation, ComplianceResult, ComplianceStatus,
    ConflictAssessment, EvidenceChunk, EvidenceGate, GateDecision, ReasoningResult, RiskLevel, Timings,
};

use crate::agents::{elapsed_ms, AnswerAgent, ComplianceAgent, ReasoningAgent, StageKind};
use crate::config::{ConfigError, RuntimeConfig};
use crate::metrics::PipelineMetrics;
use crate::providers::LlmProvider;
use crate::resilience::{BudgetTracker, Guarded, LlmUsage};
use crate::retrieval::{RetrievalError, Retriever};
use crate::trace::{AgentTrace, PipelineTraceEntry, STATUS_FALLBACK, STATUS_SUCCESS};

/// Trace name of the retrieval stage.
pub const AGENT_RETRIEVER: &str = "retriever";

/// Trace name of the evidence gate.
pub const AGENT_EVIDENCE_GATE: &str = "evidence_gate";

/// Trace name of the conflict detector.
pub const AGENT_CONFLICT_DETECTOR: &str = "conflict_detector";

/// Errors that end a pipeline run with `status=error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    #[error("Request deadline of {0:?} elapsed")]
    DeadlineExceeded(Duration),

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("Pipeline panicked: {0}")]
    Panic(String),

    #[error("Pipeline not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Retrieval(e) => e.kind(),
            PipelineError::RetrievalTimeout(_) => "RetrievalTimeout",
            PipelineError::DeadlineExceeded(_) => "DeadlineExceeded",
            PipelineError::InvalidEvidence(_) => "InvalidEvidence",
            PipelineError::Panic(_) => "Panic",
            PipelineError::NotConfigured(_) => "NotConfigured",
            PipelineError::Config(e) => e.kind(),
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Ok,
    InsufficientEvidence,
    Error,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Ok => "ok",
            PipelineStatus::InsufficientEvidence => "insufficient_evidence",
            PipelineStatus::Error => "error",
        }
    }
}

/// One question to run through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub question: String,

    /// Falls back to `retrieval.top_k`
    pub top_k: Option<usize>,

    /// Falls back to a fresh UUID v4
    pub trace_id: Option<String>,

    /// Falls back to `timeouts.request_deadline`
    pub deadline: Option<Duration>,
}

impl PipelineRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            trace_id: None,
            deadline: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Everything a run produced. Created fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub trace_id: String,
    pub question: String,
    pub top_k: usize,
    pub created_at: DateTime<Utc>,

    pub answer: String,
    pub action_items: Vec<String>,
    pub citations: Vec<Citation>,
    pub confidence: f64,

    pub policy_evidence_ok: bool,

    /// Gate reason for `insufficient_evidence`, `"<Kind>: <message>"` for `error`
    pub gating_reason: Option<String>,

    pub retrieved_chunks: Vec<EvidenceChunk>,
    pub gate: Option<GateDecision>,
    pub conflict: Option<ConflictAssessment>,
    pub compliance: Option<ComplianceResult>,
    pub reasoning: Option<ReasoningResult>,

    /// The answer stage output before the conflict override, if the stage ran
    pub generated_answer: Option<AnswerResult>,

    /// Stage name to fallback reason, for stages that used their default
    pub fallbacks: BTreeMap<String, String>,

    pub agent_trace: Vec<PipelineTraceEntry>,
    pub usage: LlmUsage,
    pub timings_ms: Timings,
}

impl PipelineResult {
    pub fn is_ok(&self) -> bool {
        self.status == PipelineStatus::Ok
    }
}

/// Retrieved chunk as shown at the request boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkView {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,

    /// Rounded to 3 decimals
    pub score: f64,
}

/// Request-boundary view of a [`PipelineResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub status: PipelineStatus,
    pub answer: String,
    pub action_items: Vec<String>,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub trace_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gating_reason: Option<String>,

    pub retrieved_chunks: Vec<ChunkView>,
    pub agent_trace: Vec<PipelineTraceEntry>,
}

impl From<&PipelineResult> for AskResponse {
    fn from(result: &PipelineResult) -> Self {
        Self {
            status: result.status,
            answer: result.answer.clone(),
            action_items: result.action_items.clone(),
            citations: result.citations.clone(),
            confidence: result.confidence,
            trace_id: result.trace_id.clone(),
            gating_reason: result.gating_reason.clone(),
            retrieved_chunks: result
                .retrieved_chunks
                .iter()
                .map(|c| ChunkView {
                    text: c.text.clone(),
                    source: c.source.clone(),
                    page: c.page,
                    score: round3(c.score),
                })
                .collect(),
            agent_trace: result.agent_trace.clone(),
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Stage outputs of a run that reached the classifier.
struct StageOutputs {
    gate: GateDecision,
    conflict: ConflictAssessment,
    compliance: ComplianceResult,
    reasoning: Option<ReasoningResult>,
    answer: Option<AnswerResult>,
}

/// Per-request state that survives deadline expiry and panics.
struct RunState {
    budget: BudgetTracker,
    trace: Mutex<AgentTrace>,
    timings: Mutex<Timings>,
    chunks: Mutex<Vec<EvidenceChunk>>,
    fallbacks: Mutex<BTreeMap<String, String>>,
}

impl RunState {
    fn new(max_tokens: u32) -> Self {
        Self {
            budget: BudgetTracker::new(max_tokens),
            trace: Mutex::new(AgentTrace::new()),
            timings: Mutex::new(Timings::new()),
            chunks: Mutex::new(Vec::new()),
            fallbacks: Mutex::new(BTreeMap::new()),
        }
    }
}

/// Runs questions through the pipeline.
///
/// # Architecture
/// - Dependency injection: provider, retriever, config and metrics are passed in
/// - Per request: budget, trace and timings are created fresh and dropped
/// - Shared: only the append-only [`PipelineMetrics`]
pub struct PipelineOrchestrator {
    config: RuntimeConfig,
    retriever: Arc<dyn Retriever>,
    gate: EvidenceGate,
    compliance: ComplianceAgent,
    reasoning: ReasoningAgent,
    answer: AnswerAgent,
    metrics: Arc<PipelineMetrics>,

    /// Skip reasoning and answer when the gate fails
    short_circuit_on_gate: bool,
}

impl PipelineOrchestrator {
    pub fn builder() -> PipelineOrchestratorBuilder {
        PipelineOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Run one question with the configured deadline and a fresh trace id.
    pub async fn process(&self, question: &str, top_k: Option<usize>) -> PipelineResult {
        let mut request = PipelineRequest::new(question);
        request.top_k = top_k;
        self.process_request(request).await
    }

    pub async fn process_with_trace_id(
        &self,
        question: &str,
        top_k: Option<usize>,
        trace_id: impl Into<String>,
    ) -> PipelineResult {
        let mut request = PipelineRequest::new(question).with_trace_id(trace_id);
        request.top_k = top_k;
        self.process_request(request).await
    }

    /// Run one request. Never fails; see [`PipelineResult::status`].
    pub async fn process_request(&self, request: PipelineRequest) -> PipelineResult {
        let started = Instant::now();
        let created_at = Utc::now();
        let trace_id = request
            .trace_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let top_k = request
            .top_k
            .filter(|k| *k > 0)
            .unwrap_or(self.config.retrieval.top_k);
        let deadline = request.deadline.unwrap_or(self.config.timeouts.request_deadline);
        let state = RunState::new(self.config.budget.max_tokens_per_request);

        let span = tracing::info_span!("pipeline", trace_id = %trace_id);
        tracing::info!(parent: &span, top_k, deadline = ?deadline, "Pipeline run started");

        let run = tokio::time::timeout(deadline, self.execute(&request.question, top_k, &state))
            .instrument(span.clone());
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_elapsed)) => Err(PipelineError::DeadlineExceeded(deadline)),
            Err(panic) => Err(PipelineError::Panic(panic_message(panic.as_ref()))),
        };

        let result = self.assemble(request.question, top_k, trace_id, created_at, outcome, state, started);
        self.metrics.record_query(result.status.as_str(), result.confidence);

        tracing::info!(
            parent: &span,
            status = result.status.as_str(),
            confidence = result.confidence,
            latency_ms = result.timings_ms.get("total_ms").copied().unwrap_or_default(),
            "Pipeline run finished"
        );
        result
    }

    async fn execute(
        &self,
        question: &str,
        top_k: usize,
        state: &RunState,
    ) -> Result<StageOutputs, PipelineError> {
        // Retrieval
        let t = Instant::now();
        let retrieval_timeout = self.config.timeouts.retrieval;
        let raw = tokio::time::timeout(retrieval_timeout, self.retriever.retrieve(question, top_k))
            .await
            .map_err(|_| PipelineError::RetrievalTimeout(retrieval_timeout))??;
        let chunks = sanitize_chunks(raw, top_k)?;
        let ms = elapsed_ms(t);
        *state.chunks.lock() = chunks.clone();
        self.record(
            state,
            "retrieve_ms",
            ms,
            PipelineTraceEntry::new(AGENT_RETRIEVER, STATUS_SUCCESS, ms)
                .input(format!("User question: {}", question))
                .rationale(format!(
                    "Retrieved top {} chunks from {} retriever",
                    chunks.len(),
                    self.retriever.name()
                ))
                .confidence(if chunks.is_empty() { 0.0 } else { 1.0 })
                .risk(if chunks.is_empty() { RiskLevel::Medium } else { RiskLevel::Low })
                .metric("chunks_retrieved", chunks.len())
                .metric("source_diversity", source_diversity(&chunks)),
        );

        // Evidence gate
        let t = Instant::now();
        let gate = self.gate.check(&chunks);
        let ms = elapsed_ms(t);
        if !gate.ok {
            tracing::info!(reason = ?gate.reason, flags = ?gate.flags, "Evidence gate failed");
        }
        self.record(
            state,
            "gate_ms",
            ms,
            PipelineTraceEntry::new(AGENT_EVIDENCE_GATE, STATUS_SUCCESS, ms)
                .input(format!("{} retrieved chunks", chunks.len()))
                .rationale(
                    gate.reason
                        .clone()
                        .unwrap_or_else(|| "Retrieved evidence met sufficiency thresholds".to_string()),
                )
                .confidence(top_score(&chunks).unwrap_or(0.0))
                .risk(if gate.ok { RiskLevel::Low } else { RiskLevel::High })
                .metric("policy_evidence_ok", gate.ok)
                .metric("flags", gate.flags.iter().cloned().collect::<Vec<_>>())
                .metric("min_chunks", self.gate.min_chunks)
                .metric("min_score", self.gate.min_score),
        );

        // Conflict detection
        let t = Instant::now();
        let conflict = detect(&chunks);
        let ms = elapsed_ms(t);
        self.record(
            state,
            "conflict_ms",
            ms,
            PipelineTraceEntry::new(AGENT_CONFLICT_DETECTOR, STATUS_SUCCESS, ms)
                .input(format!(
                    "{} retrieved chunks from {} sources",
                    chunks.len(),
                    source_diversity(&chunks)
                ))
                .rationale(if conflict.any() {
                    conflict.reason.clone()
                } else {
                    "No conflicting requirements detected across sources".to_string()
                })
                .confidence(1.0)
                .risk(if conflict.any() { RiskLevel::High } else { RiskLevel::Low })
                .metric("conflict_detected", conflict.confirmed)
                .metric("potential_conflict", conflict.potential)
                .metric("numeric_tokens", conflict.numeric_tokens.len())
                .metric("numeric_sources", conflict.numeric_sources.len()),
        );

        // Compliance
        let t = Instant::now();
        let guarded = self
            .compliance
            .run(question, &chunks, &gate, &conflict, &state.budget)
            .await;
        let ms = elapsed_ms(t);
        let compliance = self.take_value(state, StageKind::Compliance, guarded);
        let rationale = if compliance.rationale.is_empty() {
            "Evaluated policy alignment and compliance risk".to_string()
        } else {
            compliance.rationale.clone()
        };
        self.record(
            state,
            "compliance_ms",
            ms,
            PipelineTraceEntry::new(StageKind::Compliance.agent_name(), compliance.status.as_str(), ms)
                .input("Retrieved evidence passed for policy evaluation")
                .rationale(rationale)
                .confidence(compliance.confidence)
                .risk(compliance.violation_risk)
                .metric("policy_alignment_score", compliance.policy_alignment_score)
                .metric("violation_risk", compliance.violation_risk.as_str())
                .metric("conflict_detected", compliance.conflict_detected)
                .metric("potential_conflict", compliance.potential_conflict)
                .metric("conflict_reason", compliance.conflict_reason.clone())
                .metric("restriction_triggered", !compliance.is_ok())
                .metric("legal_guardrail_hit", !compliance.is_ok()),
        );

        if !gate.ok && self.short_circuit_on_gate {
            return Ok(StageOutputs {
                gate,
                conflict,
                compliance,
                reasoning: None,
                answer: None,
            });
        }

        let stage_risk = RiskLevel::from_confidence(compliance.confidence);

        // Reasoning
        let t = Instant::now();
        let guarded = self
            .reasoning
            .run(question, &compliance, &chunks, &state.budget)
            .await;
        let ms = elapsed_ms(t);
        let status = stage_status(&guarded);
        let reasoning = self.take_value(state, StageKind::Reasoning, guarded);
        self.record(
            state,
            "reasoning_ms",
            ms,
            PipelineTraceEntry::new(StageKind::Reasoning.agent_name(), status, ms)
                .input("Compliance assessment and retrieved evidence")
                .rationale("Synthesized reasoning over policy evidence")
                .confidence(compliance.confidence)
                .risk(stage_risk)
                .metric("decision_steps", reasoning.decision_path.len()),
        );

        // Answer
        let t = Instant::now();
        let guarded = self
            .answer
            .run(question, &compliance, &reasoning, &chunks, &state.budget)
            .await;
        let ms = elapsed_ms(t);
        let status = stage_status(&guarded);
        let answer = self.take_value(state, StageKind::Answer, guarded);
        self.record(
            state,
            "answer_ms",
            ms,
            PipelineTraceEntry::new(StageKind::Answer.agent_name(), status, ms)
                .input("Reasoned policy interpretation with evidence")
                .rationale("Generated final grounded response with citations")
                .confidence(compliance.confidence)
                .risk(stage_risk)
                .metric("citations_attached", answer.citations.len()),
        );

        Ok(StageOutputs {
            gate,
            conflict,
            compliance,
            reasoning: Some(reasoning),
            answer: Some(answer),
        })
    }

    fn record(&self, state: &RunState, timing_key: &str, latency_ms: f64, entry: PipelineTraceEntry) {
        tracing::debug!(
            stage = %entry.agent_name,
            status = %entry.status,
            latency_ms,
            "Stage finished"
        );
        self.metrics.record_agent(&entry.agent_name, latency_ms);
        state.timings.lock().insert(timing_key.to_string(), latency_ms);
        state.trace.lock().push(entry);
    }

    fn take_value<T>(&self, state: &RunState, stage: StageKind, guarded: Guarded<T>) -> T {
        if let Some(reason) = guarded.fallback_reason {
            self.metrics.record_fallback(stage.as_str());
            state.fallbacks.lock().insert(stage.as_str().to_string(), reason);
        }
        guarded.value
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        question: String,
        top_k: usize,
        trace_id: String,
        created_at: DateTime<Utc>,
        outcome: Result<StageOutputs, PipelineError>,
        state: RunState,
        started: Instant,
    ) -> PipelineResult {
        let RunState {
            budget,
            trace,
            timings,
            chunks,
            fallbacks,
        } = state;

        let mut timings_ms = timings.into_inner();
        timings_ms.insert("total_ms".to_string(), elapsed_ms(started));

        let mut result = PipelineResult {
            status: PipelineStatus::Error,
            trace_id,
            question,
            top_k,
            created_at,
            answer: String::new(),
            action_items: Vec::new(),
            citations: Vec::new(),
            confidence: 0.0,
            policy_evidence_ok: false,
            gating_reason: None,
            retrieved_chunks: chunks.into_inner(),
            gate: None,
            conflict: None,
            compliance: None,
            reasoning: None,
            generated_answer: None,
            fallbacks: fallbacks.into_inner(),
            agent_trace: trace.into_inner().into_entries(),
            usage: budget.usage(),
            timings_ms,
        };

        match outcome {
            Ok(outputs) => {
                let mut final_answer = outputs
                    .answer
                    .clone()
                    .unwrap_or_else(|| withheld_answer(&outputs.compliance));
                if outputs.compliance.has_conflict() {
                    apply_conflict_override(&mut final_answer);
                }

                result.policy_evidence_ok = outputs.gate.ok;
                if !outputs.gate.ok {
                    result.status = PipelineStatus::InsufficientEvidence;
                    result.gating_reason = outputs.gate.reason.clone();
                } else if outputs.compliance.status == ComplianceStatus::Error {
                    // Classifier failures have no local recovery; the safe answer stays attached.
                    result.status = PipelineStatus::Error;
                    result.gating_reason = Some(
                        result
                            .fallbacks
                            .get(StageKind::Compliance.as_str())
                            .cloned()
                            .unwrap_or_else(|| outputs.compliance.rationale.clone()),
                    );
                    tracing::error!(
                        trace_id = %result.trace_id,
                        reason = ?result.gating_reason,
                        "Compliance classification failed"
                    );
                } else {
                    result.status = PipelineStatus::Ok;
                }
                result.answer = final_answer.answer;
                result.action_items = final_answer.action_items;
                result.citations = final_answer.citations;
                result.confidence = outputs.compliance.confidence;
                result.gate = Some(outputs.gate);
                result.conflict = Some(outputs.conflict);
                result.compliance = Some(outputs.compliance);
                result.reasoning = outputs.reasoning;
                result.generated_answer = outputs.answer;
            }
            Err(err) => {
                tracing::error!(
                    trace_id = %result.trace_id,
                    error_kind = err.kind(),
                    error = %err,
                    "Pipeline run failed"
                );
                result.gating_reason = Some(format!("{}: {}", err.kind(), err));
            }
        }

        result
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("retriever", &self.retriever.name())
            .field("gate", &self.gate)
            .field("short_circuit_on_gate", &self.short_circuit_on_gate)
            .finish()
    }
}

/// Answer shown when the answer stage was skipped.
fn withheld_answer(compliance: &ComplianceResult) -> AnswerResult {
    AnswerResult {
        answer: compliance.rationale.clone(),
        action_items: Vec::new(),
        citations: Vec::new(),
        safety_note: None,
        timings_ms: Timings::new(),
    }
}

fn stage_status<T>(guarded: &Guarded<T>) -> &'static str {
    if guarded.fell_back() {
        STATUS_FALLBACK
    } else {
        STATUS_SUCCESS
    }
}

/// Reject non-finite scores, clamp the rest into `[0, 1]`, keep the returned order.
fn sanitize_chunks(chunks: Vec<EvidenceChunk>, top_k: usize) -> Result<Vec<EvidenceChunk>, PipelineError> {
    chunks
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, mut chunk)| {
            if !chunk.score.is_finite() {
                return Err(PipelineError::InvalidEvidence(format!(
                    "chunk {} from '{}' has a non-finite score",
                    i + 1,
                    chunk.source_or_unknown()
                )));
            }
            chunk.score = chunk.score.clamp(0.0, 1.0);
            Ok(chunk)
        })
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for PipelineOrchestrator.
pub struct PipelineOrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
    config: RuntimeConfig,
    metrics: Option<Arc<PipelineMetrics>>,
    short_circuit_on_gate: bool,
}

impl PipelineOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            retriever: None,
            config: RuntimeConfig::default(),
            metrics: None,
            short_circuit_on_gate: true,
        }
    }

    /// Set the text-generation provider shared by all generative stages.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share counters with other orchestrators or the embedding application.
    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// When false, reasoning and answer still run after a failed gate.
    pub fn short_circuit_on_gate(mut self, enabled: bool) -> Self {
        self.short_circuit_on_gate = enabled;
        self
    }

    /// Build the orchestrator. Configuration errors are fatal here.
    pub fn build(self) -> Result<PipelineOrchestrator, PipelineError> {
        self.config.validate()?;

        let provider = self
            .provider
            .ok_or_else(|| PipelineError::NotConfigured("No provider set".to_string()))?;
        let retriever = self
            .retriever
            .ok_or_else(|| PipelineError::NotConfigured("No retriever set".to_string()))?;

        Ok(PipelineOrchestrator {
            gate: self.config.evidence_gate(),
            compliance: ComplianceAgent::from_config(provider.clone(), &self.config)?,
            reasoning: ReasoningAgent::from_config(provider.clone(), &self.config)?,
            answer: AnswerAgent::from_config(provider, &self.config)?,
            retriever,
            metrics: self.metrics.unwrap_or_default(),
            short_circuit_on_gate: self.short_circuit_on_gate,
            config: self.config,
        })
    }
}

impl Default for PipelineOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
