//! Resilience patterns for sentinel-runtime.
//!
//! This module provides:
//! - Per-request token budget and usage accounting
//! - The fallible-with-default wrapper used at every generative call site
//!
//! Retries live in provider clients, not here.

mod budget;
mod fallback;

pub use budget::{BudgetTracker, LlmUsage, TokenBudget};
pub use fallback::{fallible_with_default, Guarded};
