//! Generative pipeline stages.
//!
//! Each stage wraps one call to the text-generation collaborator. The call is
//! bounded by a timeout and the request's token budget, its output is parsed
//! and schema-checked, and any failure yields the stage's deterministic result.

mod answer;
mod compliance;
mod reasoning;
mod traits;

use std::time::Instant;

pub use answer::AnswerAgent;
pub use compliance::{ComplianceAgent, FLAG_UNGROUNDED_CITATION, FLAG_UNVERIFIED_QUOTE};
pub use reasoning::ReasoningAgent;
pub use traits::{AgentError, StageKind, StageLlm};

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
