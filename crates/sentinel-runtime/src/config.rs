//! Runtime configuration.
//!
//! Loaded from YAML, then overridden from the environment, then validated.
//! Durations use humantime notation ("15s", "1m 30s"). An invalid
//! configuration is fatal when the orchestrator is built.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use sentinel_core::gate::{EvidenceGate, DEFAULT_MIN_CHUNKS, DEFAULT_MIN_SCORE};

use crate::agents::StageKind;
use crate::providers::CompletionConfig;

/// Errors from loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "ConfigIo",
            ConfigError::Parse(_) => "ConfigParse",
            ConfigError::InvalidEnv { .. } => "ConfigEnv",
            ConfigError::Invalid(_) => "ConfigInvalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub min_chunks: usize,
    pub min_score: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_chunks: DEFAULT_MIN_CHUNKS,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat model name; required
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            chat_model: String::new(),
            temperature: 0.1,
        }
    }
}

/// Generation limits per generative stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub compliance_max_tokens: u32,
    pub reasoning_max_tokens: u32,
    pub answer_max_tokens: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            compliance_max_tokens: 450,
            reasoning_max_tokens: 350,
            answer_max_tokens: 700,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on one generative call
    #[serde(with = "duration_str")]
    pub llm_call: Duration,

    #[serde(with = "duration_str")]
    pub retrieval: Duration,

    /// Bound on the whole pipeline invocation
    #[serde(with = "duration_str")]
    pub request_deadline: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_call: Duration::from_secs(15),
            retrieval: Duration::from_secs(10),
            request_deadline: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Prompt plus completion tokens allowed across one invocation.
    ///
    /// Each stage must be able to reserve its prompt estimate plus its full
    /// `max_tokens` before calling the provider. The prompts carry every
    /// retrieved chunk, so with the default stage limits a `top_k` of 10 or
    /// more can leave the answer stage short and it falls back with
    /// `BudgetExceeded`. Raise this alongside `retrieval.top_k`.
    pub max_tokens_per_request: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_request: 4000,
        }
    }
}

/// Which provider to build and its provider-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub settings: serde_json::Value,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "openai".to_string(),
            settings: serde_json::json!({}),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub gate: GateConfig,
    pub retrieval: RetrievalConfig,
    pub model: ModelConfig,
    pub stages: StageConfig,
    pub timeouts: TimeoutConfig,
    pub budget: BudgetConfig,
    pub provider: ProviderConfig,
}

impl RuntimeConfig {
    /// Defaults with the given chat model.
    pub fn with_model(chat_model: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.model.chat_model = chat_model.into();
        config
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup.
    ///
    /// Recognized: `CHAT_MODEL`, `MIN_EVIDENCE_CHUNKS`, `MIN_EVIDENCE_SCORE`,
    /// `RETRIEVER_TOP_K`, `COMPLIANCE_MAX_TOKENS`, `REASONING_MAX_TOKENS`,
    /// `ANSWER_MAX_TOKENS`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(model) = get("CHAT_MODEL") {
            self.model.chat_model = model;
        }
        if let Some(v) = get("MIN_EVIDENCE_CHUNKS") {
            self.gate.min_chunks = parse_env("MIN_EVIDENCE_CHUNKS", &v)?;
        }
        if let Some(v) = get("MIN_EVIDENCE_SCORE") {
            self.gate.min_score = parse_env("MIN_EVIDENCE_SCORE", &v)?;
        }
        if let Some(v) = get("RETRIEVER_TOP_K") {
            self.retrieval.top_k = parse_env("RETRIEVER_TOP_K", &v)?;
        }
        if let Some(v) = get("COMPLIANCE_MAX_TOKENS") {
            self.stages.compliance_max_tokens = parse_env("COMPLIANCE_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("REASONING_MAX_TOKENS") {
            self.stages.reasoning_max_tokens = parse_env("REASONING_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("ANSWER_MAX_TOKENS") {
            self.stages.answer_max_tokens = parse_env("ANSWER_MAX_TOKENS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.chat_model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "model.chat_model is required (or set CHAT_MODEL)".to_string(),
            ));
        }
        if self.gate.min_chunks == 0 {
            return Err(ConfigError::Invalid("gate.min_chunks must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.gate.min_score) {
            return Err(ConfigError::Invalid(format!(
                "gate.min_score must be within [0, 1], got {}",
                self.gate.min_score
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.temperature must be within [0, 2], got {}",
                self.model.temperature
            )));
        }
        for stage in [StageKind::Compliance, StageKind::Reasoning, StageKind::Answer] {
            let max_tokens = self.max_tokens_for(stage);
            if max_tokens > self.budget.max_tokens_per_request {
                return Err(ConfigError::Invalid(format!(
                    "stages.{}_max_tokens ({}) exceeds budget.max_tokens_per_request ({})",
                    stage.as_str(),
                    max_tokens,
                    self.budget.max_tokens_per_request
                )));
            }
        }
        for (name, value) in [
            ("timeouts.llm_call", self.timeouts.llm_call),
            ("timeouts.retrieval", self.timeouts.retrieval),
            ("timeouts.request_deadline", self.timeouts.request_deadline),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }

    pub fn evidence_gate(&self) -> EvidenceGate {
        EvidenceGate::new(self.gate.min_chunks, self.gate.min_score)
    }

    pub fn max_tokens_for(&self, stage: StageKind) -> u32 {
        match stage {
            StageKind::Compliance => self.stages.compliance_max_tokens,
            StageKind::Reasoning => self.stages.reasoning_max_tokens,
            StageKind::Answer => self.stages.answer_max_tokens,
        }
    }

    /// Completion settings for one generative stage.
    pub fn completion_config(&self, stage: StageKind) -> CompletionConfig {
        CompletionConfig {
            model: self.model.chat_model.clone(),
            max_tokens: self.max_tokens_for(stage),
            temperature: self.model.temperature,
            timeout: self.timeouts.llm_call,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Serde adapter for humantime durations.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
