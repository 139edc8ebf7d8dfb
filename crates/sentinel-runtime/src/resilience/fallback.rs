//! Fallible-with-default wrapper for generative call sites.
//!
//! Each call site supplies the call, a validator for the raw response, and a
//! deterministic default built from non-generative inputs. The wrapper always
//! yields a value; failures are recorded, never propagated.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::agents::{AgentError, StageKind};

/// A stage value plus the reason it came from the default, if it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guarded<T> {
    pub value: T,

    /// `"<Kind>: <message>"` when the default was used
    pub fallback_reason: Option<String>,
}

impl<T> Guarded<T> {
    pub fn accepted(value: T) -> Self {
        Self {
            value,
            fallback_reason: None,
        }
    }

    pub fn fallback(value: T, error: &AgentError) -> Self {
        Self {
            value,
            fallback_reason: Some(format!("{}: {}", error.kind(), error)),
        }
    }

    pub fn fell_back(&self) -> bool {
        self.fallback_reason.is_some()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Run `call`, validate its output, or build the default.
pub async fn fallible_with_default<T, Fut, V, D>(
    stage: StageKind,
    call: Fut,
    validate: V,
    default: D,
) -> Guarded<T>
where
    Fut: Future<Output = Result<String, AgentError>>,
    V: FnOnce(&str) -> Result<T, AgentError>,
    D: FnOnce(&AgentError) -> T,
{
    let outcome = match call.await {
        Ok(raw) => validate(&raw),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(value) => Guarded::accepted(value),
        Err(err) => {
            tracing::warn!(
                stage = stage.as_str(),
                error_kind = err.kind(),
                error = %err,
                "Generative output rejected, using deterministic fallback"
            );
            let value = default(&err);
            Guarded::fallback(value, &err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use sentinel_core::JsonContractError;

    fn parse_number(raw: &str) -> Result<u32, AgentError> {
        raw.trim()
            .parse()
            .map_err(|_| AgentError::Malformed(JsonContractError::Malformed(raw.to_string())))
    }

    #[tokio::test]
    async fn test_valid_output_is_accepted() {
        let guarded = fallible_with_default(
            StageKind::Answer,
            async { Ok("42".to_string()) },
            parse_number,
            |_| 0,
        )
        .await;
        assert_eq!(guarded, Guarded::accepted(42));
        assert!(!guarded.fell_back());
    }

    #[tokio::test]
    async fn test_invalid_output_uses_default() {
        let guarded = fallible_with_default(
            StageKind::Answer,
            async { Ok("forty-two".to_string()) },
            parse_number,
            |_| 7,
        )
        .await;
        assert_eq!(guarded.value, 7);
        assert!(guarded.fallback_reason.unwrap().starts_with("MalformedJson: "));
    }

    #[tokio::test]
    async fn test_call_failure_uses_default_without_validating() {
        let guarded = fallible_with_default(
            StageKind::Reasoning,
            async { Err(AgentError::Provider(ProviderError::AuthError)) },
            |_: &str| -> Result<u32, AgentError> { panic!("validator must not run") },
            |err| if err.kind() == "AuthError" { 1 } else { 2 },
        )
        .await;
        assert_eq!(guarded.value, 1);
        assert_eq!(
            guarded.fallback_reason.as_deref(),
            Some("AuthError: LLM call failed: Authentication failed")
        );
    }
}
