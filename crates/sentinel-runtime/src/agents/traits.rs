//! Shared pieces of the generative stages.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use sentinel_core::{JsonContractError, SchemaError};

use crate::prompts::SYSTEM_PROMPT;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::BudgetTracker;

/// Errors from a generative stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Token budget exceeded: estimated {estimated}, remaining {remaining}")]
    BudgetExceeded { estimated: u32, remaining: u32 },

    #[error(transparent)]
    Malformed(#[from] JsonContractError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable error kind for traces and flags.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Provider(e) => e.kind(),
            AgentError::Timeout(_) => "Timeout",
            AgentError::BudgetExceeded { .. } => "BudgetExceeded",
            AgentError::Malformed(e) => e.kind(),
            AgentError::Schema(e) => e.kind(),
            AgentError::Internal(_) => "Internal",
        }
    }
}

/// The three stages that consult the generative collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Compliance,
    Reasoning,
    Answer,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Compliance => "compliance",
            StageKind::Reasoning => "reasoning",
            StageKind::Answer => "answer",
        }
    }

    /// Name recorded in the pipeline trace.
    pub fn agent_name(&self) -> &'static str {
        match self {
            StageKind::Compliance => "compliance_classifier",
            StageKind::Reasoning => "reasoning_synthesizer",
            StageKind::Answer => "answer_generator",
        }
    }
}

/// A provider bound to one stage's completion settings.
#[derive(Clone)]
pub struct StageLlm {
    stage: StageKind,
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
}

impl StageLlm {
    pub fn new(stage: StageKind, provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            stage,
            provider,
            config,
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// One bounded completion: budget check, timeout, usage accounting.
    ///
    /// Returns the raw response text, which may be empty or malformed.
    pub async fn invoke(&self, prompt: String, budget: &BudgetTracker) -> Result<String, AgentError> {
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];

        let prompt_estimate = messages
            .iter()
            .map(|m| self.provider.estimate_tokens(&m.content))
            .fold(0u32, u32::saturating_add);
        let estimated = prompt_estimate.saturating_add(self.config.max_tokens);
        if !budget.can_afford(estimated) {
            return Err(AgentError::BudgetExceeded {
                estimated,
                remaining: budget.remaining(),
            });
        }

        tracing::debug!(
            stage = self.stage.as_str(),
            provider = self.provider.name(),
            prompt_tokens_estimate = prompt_estimate,
            "Invoking provider"
        );

        let timeout = self.config.timeout;
        let response = tokio::time::timeout(timeout, self.provider.complete(messages, &self.config))
            .await
            .map_err(|_| AgentError::Timeout(timeout))??;

        budget.record_usage(self.stage, &response.usage, &response.model);
        Ok(response.content)
    }
}

impl std::fmt::Debug for StageLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageLlm")
            .field("stage", &self.stage)
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, ScriptedReply};

    fn llm(provider: ScriptedProvider, timeout: Duration) -> StageLlm {
        let mut config = CompletionConfig::new("test-model", 100);
        config.timeout = timeout;
        StageLlm::new(StageKind::Answer, Arc::new(provider), config)
    }

    #[tokio::test]
    async fn test_invoke_records_usage() {
        let budget = BudgetTracker::new(10_000);
        let raw = llm(ScriptedProvider::with_contents(["{\"answer\": \"ok\"}"]), Duration::from_secs(1))
            .invoke("question".to_string(), &budget)
            .await
            .unwrap();
        assert_eq!(raw, "{\"answer\": \"ok\"}");
        assert_eq!(budget.usage().llm_calls, 1);
    }

    #[tokio::test]
    async fn test_invoke_refuses_over_budget() {
        let provider = Arc::new(ScriptedProvider::repeating("{}"));
        let stage = StageLlm::new(StageKind::Answer, provider.clone(), CompletionConfig::new("m", 700));
        let budget = BudgetTracker::new(100);

        let err = stage.invoke("question".to_string(), &budget).await.unwrap_err();
        assert_eq!(err.kind(), "BudgetExceeded");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_completion_limit_is_refused() {
        let provider = Arc::new(ScriptedProvider::repeating("{}"));
        let stage = StageLlm::new(StageKind::Answer, provider.clone(), CompletionConfig::new("m", u32::MAX));
        let budget = BudgetTracker::new(4000);

        let err = stage.invoke("question".to_string(), &budget).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::BudgetExceeded { estimated: u32::MAX, remaining: 4000 }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let provider = ScriptedProvider::new([ScriptedReply::Delayed {
            after: Duration::from_secs(30),
            content: "{}".into(),
        }]);
        let err = llm(provider, Duration::from_secs(2))
            .invoke("question".to_string(), &BudgetTracker::new(10_000))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Timeout(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_provider_error_kind_passes_through() {
        let provider = ScriptedProvider::new([ScriptedReply::Failure(ProviderError::AuthError)]);
        let err = llm(provider, Duration::from_secs(1))
            .invoke("q".to_string(), &BudgetTracker::new(10_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AuthError");
    }
}
