//! Two-phase JSON parsing for generative output.
//!
//! Phase 1 parses the whole response strictly. Phase 2 takes the substring
//! between the first `{` and the last `}` and parses that. Nothing else is
//! attempted; when both phases fail the caller gets [`JsonContractError::Malformed`].

use serde_json::Value;
use thiserror::Error;

/// Errors from parsing generative output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JsonContractError {
    #[error("Empty response from text-generation service")]
    Empty,

    #[error("Response is not valid JSON and no JSON object could be extracted: {0}")]
    Malformed(String),
}

impl JsonContractError {
    /// Stable error kind for traces.
    pub fn kind(&self) -> &'static str {
        match self {
            JsonContractError::Empty => "EmptyResponse",
            JsonContractError::Malformed(_) => "MalformedJson",
        }
    }
}

/// Which phase produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    Strict,
    BraceExtraction,
}

/// A parsed response and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson {
    pub value: Value,
    pub phase: ParsePhase,
}

/// Parse generative output that is expected to contain one JSON object.
pub fn parse_json_object(raw: &str) -> Result<ParsedJson, JsonContractError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JsonContractError::Empty);
    }

    let strict_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            return Ok(ParsedJson {
                value,
                phase: ParsePhase::Strict,
            })
        }
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                tracing::debug!(
                    strict_error = %strict_err,
                    skipped_bytes = trimmed.len() - (end + 1 - start),
                    "Recovered JSON object by brace extraction"
                );
                return Ok(ParsedJson {
                    value,
                    phase: ParsePhase::BraceExtraction,
                });
            }
        }
    }

    Err(JsonContractError::Malformed(strict_err.to_string()))
}
