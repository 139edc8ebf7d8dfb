//! Evidence gate: is there enough trustworthy evidence to answer at all?
//!
//! The gate is the single choke point in front of every generative call.
//! It is a pure function of the evidence set and its two thresholds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::evidence::{top_score, EvidenceChunk};

/// Default minimum number of retrieved chunks.
pub const DEFAULT_MIN_CHUNKS: usize = 2;

/// Default minimum similarity of the top-ranked chunk.
pub const DEFAULT_MIN_SCORE: f64 = 0.55;

/// Flag raised when retrieval returned nothing.
pub const FLAG_NO_RETRIEVED_CHUNKS: &str = "no_retrieved_chunks";

/// Result of gating an evidence set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub ok: bool,

    /// Human-readable reason, present only when `ok == false`
    pub reason: Option<String>,

    /// Machine-readable flags, empty when `ok == true`
    pub flags: BTreeSet<String>,
}

impl GateDecision {
    fn pass() -> Self {
        Self {
            ok: true,
            reason: None,
            flags: BTreeSet::new(),
        }
    }

    fn fail(flag: String, reason: String) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            flags: BTreeSet::from([flag]),
        }
    }
}

/// Evidence sufficiency thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvidenceGate {
    pub min_chunks: usize,
    pub min_score: f64,
}

impl Default for EvidenceGate {
    fn default() -> Self {
        Self {
            min_chunks: DEFAULT_MIN_CHUNKS,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl EvidenceGate {
    pub fn new(min_chunks: usize, min_score: f64) -> Self {
        Self {
            min_chunks,
            min_score,
        }
    }

    /// Gate an evidence set. Rules apply in order; the first failing rule wins.
    pub fn check(&self, chunks: &[EvidenceChunk]) -> GateDecision {
        if chunks.is_empty() {
            return GateDecision::fail(
                FLAG_NO_RETRIEVED_CHUNKS.to_string(),
                self.not_enough_context_reason(),
            );
        }

        if chunks.len() < self.min_chunks {
            return GateDecision::fail(
                format!("insufficient_chunks<{}", self.min_chunks),
                self.not_enough_context_reason(),
            );
        }

        let best = top_score(chunks).unwrap_or(0.0);
        if best < self.min_score {
            return GateDecision::fail(
                format!("low_top_score<{}", self.min_score),
                format!(
                    "Policy evidence too weak (best_score={:.4} < {}).",
                    best, self.min_score
                ),
            );
        }

        GateDecision::pass()
    }

    fn not_enough_context_reason(&self) -> String {
        format!(
            "Not enough policy context (need ≥ {} chunks).",
            self.min_chunks
        )
    }
}

/// Gate with explicit thresholds.
pub fn gate(chunks: &[EvidenceChunk], min_chunks: usize, min_score: f64) -> GateDecision {
    EvidenceGate::new(min_chunks, min_score).check(chunks)
}
