//! Output contracts for generative collaborators.
//!
//! Generative text is never trusted directly. It is parsed with a bounded
//! two-phase parser and then checked against a JSON Schema per stage before
//! any field is read.

mod parser;
mod schema;

pub use parser::{parse_json_object, JsonContractError, ParsePhase, ParsedJson};
pub use schema::{validate_output, OutputContract, SchemaError};
