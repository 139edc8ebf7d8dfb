//! # sentinel-core
//!
//! Deterministic decision logic for the Sentinel policy question pipeline.
//!
//! This crate answers, without calling any model:
//! - Is the retrieved evidence sufficient to answer at all?
//! - Do the sources disagree?
//! - What verdict, risk and decision path may be recorded?
//! - What is the safe answer when generation is unavailable?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same evidence and compliance input, same output
//! 2. **No I/O**: Generation and retrieval live in `sentinel-runtime`
//! 3. **Validated**: Generative output passes a two-phase parser and a JSON
//!    Schema contract before any field is read
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_core::{detect, EvidenceChunk, EvidenceGate};
//!
//! let chunks = vec![
//!     EvidenceChunk::new(0.91, "policy_a.txt", "Up to 10 days per month."),
//!     EvidenceChunk::new(0.80, "policy_b.txt", "Up to 15 days per month."),
//! ];
//! assert!(EvidenceGate::default().check(&chunks).ok);
//! assert!(detect(&chunks).confirmed);
//! ```

pub mod answer;
pub mod conflict;
pub mod contract;
pub mod evidence;
pub mod gate;
pub mod synthesizer;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use answer::{apply_conflict_override, fallback_answer, merge_generated, CONFLICT_ACTION_ITEM};
pub use conflict::{detect, ConflictAssessment, ConflictDetector};
pub use contract::{
    parse_json_object, validate_output, JsonContractError, OutputContract, ParsePhase, ParsedJson,
    SchemaError,
};
pub use evidence::EvidenceChunk;
pub use gate::{gate, EvidenceGate, GateDecision};
pub use synthesizer::Synthesizer;
pub use types::{
    AnswerResult, Citation, ComplianceResult, ComplianceStatus, ComplianceVerdict,
    ReasoningResult, RiskLevel, Timings,
};
pub use verdict::{resolve_violation_risk, ClassificationDraft};
