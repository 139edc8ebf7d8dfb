//! Conflict detection across retrieved policy sources.
//!
//! Numeric disagreement (e.g., "10 days" vs "15 days") is treated as a
//! confirmed conflict. Several sources agreeing on a single number is only a
//! potential ambiguity about precedence.
//!
//! The heuristic is deliberately coarse: incidental numbers such as years or
//! section numbers also count. That precision gap is known and kept.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::evidence::EvidenceChunk;

lazy_static! {
    /// Standalone integer tokens.
    static ref NUMERIC_TOKEN: Regex = Regex::new(r"\b\d+\b").unwrap();
}

pub const CONFIRMED_CONFLICT_REASON: &str =
    "Different numeric requirements found across policy sources";

pub const POTENTIAL_CONFLICT_REASON: &str =
    "Multiple policy sources reference requirements without clear authoritative precedence";

/// Conflict signals for an evidence set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAssessment {
    pub confirmed: bool,
    pub potential: bool,
    pub reason: String,

    /// Distinct numeric tokens across every chunk
    pub numeric_tokens: BTreeSet<String>,

    /// Sources that contributed at least one numeric token
    pub numeric_sources: BTreeSet<String>,
}

impl ConflictAssessment {
    pub fn any(&self) -> bool {
        self.confirmed || self.potential
    }
}

/// Scans evidence for contradictory numeric requirements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, chunks: &[EvidenceChunk]) -> ConflictAssessment {
        let mut by_source: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut pooled: BTreeSet<String> = BTreeSet::new();

        for chunk in chunks {
            let tokens = numeric_tokens(&chunk.text);
            if tokens.is_empty() {
                continue;
            }
            pooled.extend(tokens.iter().cloned());
            by_source
                .entry(chunk.source_or_unknown().to_string())
                .or_default()
                .extend(tokens);
        }

        let numeric_sources: BTreeSet<String> = by_source.into_keys().collect();

        let (confirmed, potential, reason) = if pooled.len() >= 2 {
            (true, false, CONFIRMED_CONFLICT_REASON.to_string())
        } else if numeric_sources.len() >= 2 {
            (false, true, POTENTIAL_CONFLICT_REASON.to_string())
        } else {
            (false, false, String::new())
        };

        ConflictAssessment {
            confirmed,
            potential,
            reason,
            numeric_tokens: pooled,
            numeric_sources,
        }
    }
}

/// Distinct standalone numeric tokens in lowercased text.
pub fn numeric_tokens(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    NUMERIC_TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Detect conflicts with the default detector.
pub fn detect(chunks: &[EvidenceChunk]) -> ConflictAssessment {
    ConflictDetector::new().detect(chunks)
}
