//! Citation validation ensures generated citations point into the evidence set.
//!
//! A citation the model produced is kept only if its source (and page, when
//! given) matches a retrieved chunk of the same invocation.

use sentinel_core::{Citation, EvidenceChunk};
use thiserror::Error;

/// Errors from citation validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CitationValidationError {
    #[error("Unknown citation source: {document}")]
    UnknownSource { document: String },

    #[error("Page {page} not present in source {document}")]
    PageNotInSource { document: String, page: u32 },
}

impl CitationValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            CitationValidationError::UnknownSource { .. } => "UnknownSource",
            CitationValidationError::PageNotInSource { .. } => "PageNotInSource",
        }
    }
}

/// Result of filtering a citation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundedCitations {
    pub kept: Vec<Citation>,
    pub dropped: Vec<CitationValidationError>,

    /// Kept citations whose quote hint was not found in any matching chunk
    pub unverified_quotes: usize,
}

/// Checks citations against one invocation's evidence.
///
/// # Validation Steps
/// 1. The source must match a chunk's source
/// 2. A page, when present, must match a chunk from that source
/// 3. The quote hint is checked softly; a mismatch never drops the citation
pub struct CitationValidator<'a> {
    chunks: &'a [EvidenceChunk],
}

impl<'a> CitationValidator<'a> {
    pub fn new(chunks: &'a [EvidenceChunk]) -> Self {
        Self { chunks }
    }

    /// Validate a single citation's source and page.
    pub fn validate(&self, citation: &Citation) -> Result<(), CitationValidationError> {
        let source = citation.source.trim();
        let mut from_source = self.matching_source(source).peekable();
        if from_source.peek().is_none() {
            return Err(CitationValidationError::UnknownSource {
                document: source.to_string(),
            });
        }

        match citation.page {
            None => Ok(()),
            Some(page) if from_source.any(|c| c.page == Some(page)) => Ok(()),
            Some(page) => Err(CitationValidationError::PageNotInSource {
                document: source.to_string(),
                page,
            }),
        }
    }

    /// Whether the quote hint appears in a chunk the citation points to.
    ///
    /// Empty hints are treated as matching.
    pub fn quote_matches(&self, citation: &Citation) -> bool {
        let hint = normalize(&citation.quote_hint);
        if hint.is_empty() {
            return true;
        }

        self.matching_source(citation.source.trim())
            .filter(|c| citation.page.is_none() || c.page == citation.page)
            .any(|c| normalize(&c.text).contains(&hint))
    }

    /// Keep grounded citations, in order, and report the rest.
    pub fn retain_grounded(&self, citations: Vec<Citation>) -> GroundedCitations {
        let mut grounded = GroundedCitations::default();

        for citation in citations {
            match self.validate(&citation) {
                Ok(()) => {
                    if !self.quote_matches(&citation) {
                        grounded.unverified_quotes += 1;
                    }
                    grounded.kept.push(citation);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "Dropping ungrounded citation");
                    grounded.dropped.push(err);
                }
            }
        }

        grounded
    }

    fn matching_source<'s>(&'s self, source: &'s str) -> impl Iterator<Item = &'a EvidenceChunk> + 's
    where
        'a: 's,
    {
        self.chunks.iter().filter(move |c| c.source.trim() == source)
    }
}

/// Normalize whitespace and case for quote comparison.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
