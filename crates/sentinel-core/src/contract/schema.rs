//! JSON Schema validation for generative stage output.
//!
//! Each generative stage has an embedded schema under `schemas/`. Schemas
//! check shape only; value-level coercion (verdict normalization, confidence
//! clamping) happens after validation in the stage's own code.

use std::sync::OnceLock;
use thiserror::Error;

const COMPLIANCE_SCHEMA_JSON: &str = include_str!("../../schemas/compliance.schema.json");
const REASONING_SCHEMA_JSON: &str = include_str!("../../schemas/reasoning.schema.json");
const ANSWER_SCHEMA_JSON: &str = include_str!("../../schemas/answer.schema.json");

static COMPLIANCE_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static REASONING_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static ANSWER_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),

    #[error("Output violates {contract} contract: {}", .errors.join("; "))]
    Violation {
        contract: &'static str,
        errors: Vec<String>,
    },
}

impl SchemaError {
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaError::LoadError(_) => "SchemaLoadError",
            SchemaError::Violation { .. } => "SchemaViolation",
        }
    }
}

/// The generative stage whose output is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContract {
    Compliance,
    Reasoning,
    Answer,
}

impl OutputContract {
    pub fn name(&self) -> &'static str {
        match self {
            OutputContract::Compliance => "compliance",
            OutputContract::Reasoning => "reasoning",
            OutputContract::Answer => "answer",
        }
    }

    fn validator(&self) -> Result<&'static jsonschema::Validator, SchemaError> {
        let (cell, source) = match self {
            OutputContract::Compliance => (&COMPLIANCE_SCHEMA, COMPLIANCE_SCHEMA_JSON),
            OutputContract::Reasoning => (&REASONING_SCHEMA, REASONING_SCHEMA_JSON),
            OutputContract::Answer => (&ANSWER_SCHEMA, ANSWER_SCHEMA_JSON),
        };

        let result = cell.get_or_init(|| {
            let schema_value: serde_json::Value = match serde_json::from_str(source) {
                Ok(v) => v,
                Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
            };

            match jsonschema::options().build(&schema_value) {
                Ok(v) => Ok(v),
                Err(e) => Err(format!("Failed to compile schema: {}", e)),
            }
        });

        match result {
            Ok(v) => Ok(v),
            Err(e) => Err(SchemaError::LoadError(e.clone())),
        }
    }
}

/// Validate a parsed response against its stage contract.
pub fn validate_output(
    contract: OutputContract,
    value: &serde_json::Value,
) -> Result<(), SchemaError> {
    let validator = contract.validator()?;

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Violation {
            contract: contract.name(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_schemas_compile() {
        for contract in [
            OutputContract::Compliance,
            OutputContract::Reasoning,
            OutputContract::Answer,
        ] {
            assert!(contract.validator().is_ok(), "{} schema", contract.name());
        }
    }

    #[test]
    fn test_compliance_accepts_unexpected_verdict_strings() {
        let value = json!({
            "verdict": "mostly_fine",
            "confidence": "0.7",
            "rationale": "r",
            "policy_citations": [{"source": "a.txt", "page": 1, "quote_hint": "q"}],
            "safety_flags": []
        });
        assert!(validate_output(OutputContract::Compliance, &value).is_ok());
    }

    #[test]
    fn test_compliance_rejects_non_object() {
        let err = validate_output(OutputContract::Compliance, &json!(["compliant"])).unwrap_err();
        assert_eq!(err.kind(), "SchemaViolation");
    }

    #[test]
    fn test_compliance_rejects_string_citations() {
        let value = json!({"verdict": "compliant", "policy_citations": "a.txt"});
        assert!(validate_output(OutputContract::Compliance, &value).is_err());
    }

    #[test]
    fn test_reasoning_requires_summary() {
        assert!(validate_output(OutputContract::Reasoning, &json!({"confidence_note": "x"})).is_err());
        assert!(validate_output(OutputContract::Reasoning, &json!({"summary_reasoning": ""})).is_err());
        assert!(validate_output(OutputContract::Reasoning, &json!({"summary_reasoning": "ok"})).is_ok());
    }

    #[test]
    fn test_answer_requires_answer_but_not_lists() {
        assert!(validate_output(OutputContract::Answer, &json!({"action_items": []})).is_err());
        let value = json!({"answer": "Yes.", "action_items": "call HR", "citations": null});
        assert!(validate_output(OutputContract::Answer, &value).is_ok());
    }
}
