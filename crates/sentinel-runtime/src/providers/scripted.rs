//! Deterministic provider that replays queued replies.
//!
//! Used for offline runs and tests. Each call pops the next reply; once the
//! queue is empty the provider either repeats a fixed reply or fails.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};

/// One queued reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Content(String),
    Failure(ProviderError),
    /// Content returned only after sleeping
    Delayed { after: Duration, content: String },
    /// Panics inside the call
    Panic(String),
}

pub struct ScriptedProvider {
    name: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    repeat: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            name: "scripted".to_string(),
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the given contents in order.
    pub fn with_contents<S: Into<String>>(contents: impl IntoIterator<Item = S>) -> Self {
        Self::new(contents.into_iter().map(|c| ScriptedReply::Content(c.into())))
    }

    /// Same content for every call.
    pub fn repeating(content: impl Into<String>) -> Self {
        Self {
            repeat: Some(content.into()),
            ..Self::new(Vec::<ScriptedReply>::new())
        }
    }

    /// Provider with nothing queued; every call fails.
    pub fn offline() -> Self {
        Self {
            name: "offline".to_string(),
            ..Self::new(Vec::<ScriptedReply>::new())
        }
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Messages of every call so far.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        self.replies
            .lock()
            .pop_front()
            .or_else(|| self.repeat.clone().map(ScriptedReply::Content))
    }

    fn respond(&self, messages: &[ChatMessage], content: String, config: &CompletionConfig) -> CompletionResponse {
        let prompt_tokens = messages
            .iter()
            .map(|m| self.estimate_tokens(&m.content))
            .sum();
        let usage = TokenUsage {
            prompt_tokens,
            completion_tokens: self.estimate_tokens(&content),
        };

        CompletionResponse {
            content,
            usage,
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        }
    }
}

impl std::fmt::Debug for ScriptedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedProvider")
            .field("name", &self.name)
            .field("queued", &self.replies.lock().len())
            .field("repeat", &self.repeat.is_some())
            .finish()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().push(messages.clone());

        match self.next_reply() {
            Some(ScriptedReply::Content(content)) => Ok(self.respond(&messages, content, config)),
            Some(ScriptedReply::Failure(err)) => Err(err),
            Some(ScriptedReply::Delayed { after, content }) => {
                tokio::time::sleep(after).await;
                Ok(self.respond(&messages, content, config))
            }
            Some(ScriptedReply::Panic(message)) => panic!("{}", message),
            None => Err(ProviderError::NotConfigured(format!(
                "{} provider has no reply queued",
                self.name
            ))),
        }
    }

    async fn health_check(&self) -> bool {
        self.repeat.is_some() || !self.replies.lock().is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for scripted providers.
///
/// ## Configuration Format
/// ```json
/// {
///   "responses": ["{\"verdict\": \"compliant\"}"],
///   "repeat": "{\"answer\": \"...\"}"
/// }
/// ```
pub struct ScriptedProviderFactory;

impl ProviderFactory for ScriptedProviderFactory {
    fn provider_type(&self) -> &'static str {
        "scripted"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;

        let responses: Vec<String> = config["responses"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut provider = ScriptedProvider::with_contents(responses);
        provider.repeat = config["repeat"].as_str().map(str::to_string);
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        match &config["responses"] {
            JsonValue::Null => Ok(()),
            JsonValue::Array(items) if items.iter().all(JsonValue::is_string) => Ok(()),
            _ => Err(ProviderError::NotConfigured(
                "'responses' must be an array of strings".to_string(),
            )),
        }
    }

    fn description(&self) -> &'static str {
        "Replays queued responses without network access"
    }
}
