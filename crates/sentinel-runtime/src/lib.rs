//! # sentinel-runtime
//!
//! Generative stages and orchestration for the Sentinel policy question
//! pipeline.
//!
//! `sentinel-core` decides what the evidence supports. This crate adds the
//! parts that talk to the outside world:
//! - Retrieval through the [`Retriever`] contract
//! - Compliance, reasoning and answer stages over an [`LlmProvider`]
//! - Per-request token budgets, timeouts and deterministic fallbacks
//! - The [`PipelineOrchestrator`] that sequences everything and records an
//!   auditable trace
//!
//! ## Guarantees
//!
//! A run never fails outward. Retrieval errors, deadline expiry and panics
//! become `status=error`; a failed generative stage uses its deterministic
//! default and the run continues.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sentinel_runtime::{PipelineOrchestrator, RuntimeConfig, ScriptedProvider, StaticRetriever};
//!
//! let orchestrator = PipelineOrchestrator::builder()
//!     .provider(Arc::new(ScriptedProvider::offline()))
//!     .retriever(Arc::new(StaticRetriever::from_json_file("chunks.json")?))
//!     .config(RuntimeConfig::with_model("gpt-4o-mini"))
//!     .build()?;
//!
//! let result = orchestrator.process("Can I work remotely?", None).await;
//! println!("{}: {}", result.status.as_str(), result.answer);
//! ```

pub mod agents;
pub mod config;
pub mod evidence;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;
pub mod trace;

pub use agents::{AgentError, AnswerAgent, ComplianceAgent, ReasoningAgent, StageKind, StageLlm};
pub use config::{ConfigError, RuntimeConfig};
pub use evidence::{CitationValidationError, CitationValidator, GroundedCitations};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use orchestrator::{
    AskResponse, ChunkView, PipelineError, PipelineOrchestrator, PipelineOrchestratorBuilder,
    PipelineRequest, PipelineResult, PipelineStatus,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry, ScriptedProvider, ScriptedReply, TokenUsage,
};
pub use resilience::{BudgetTracker, Guarded, LlmUsage};
pub use retrieval::{RetrievalError, Retriever, StaticRetriever};
pub use trace::{AgentTrace, PipelineTraceEntry};

#[cfg(feature = "openai")]
pub use providers::OpenAiProvider;
