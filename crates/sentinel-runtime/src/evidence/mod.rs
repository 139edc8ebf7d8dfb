//! Citation grounding for generated output.
//!
//! Generated citations are checked against the evidence set of the same
//! invocation. Anything that does not point at a retrieved chunk is dropped.

mod validator;

pub use validator::{CitationValidationError, CitationValidator, GroundedCitations};
