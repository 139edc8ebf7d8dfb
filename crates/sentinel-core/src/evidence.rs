//! Retrieved evidence for a single pipeline invocation.
//!
//! Chunks are produced by the retrieval collaborator, ranked by descending
//! similarity, and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum characters of chunk text rendered into compact prompt listings.
pub const COMPACT_TEXT_LIMIT: usize = 900;

/// One retrieved passage with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    /// Similarity score in `[0, 1]`
    pub score: f64,

    /// Source document identifier (e.g., "remote_work_v1.txt")
    pub source: String,

    #[serde(default)]
    pub page: Option<u32>,

    pub text: String,

    #[serde(default, alias = "id")]
    pub chunk_id: Option<String>,
}

impl EvidenceChunk {
    pub fn new(score: f64, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            score,
            source: source.into(),
            page: None,
            text: text.into(),
            chunk_id: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_chunk_id(mut self, id: impl Into<String>) -> Self {
        self.chunk_id = Some(id.into());
        self
    }

    /// Source identifier, with blank sources reported as "unknown".
    pub fn source_or_unknown(&self) -> &str {
        if self.source.trim().is_empty() {
            "unknown"
        } else {
            &self.source
        }
    }

    /// Text with newlines flattened, as used in verbatim prompt listings.
    pub fn flattened_text(&self) -> String {
        self.text.replace('\n', " ")
    }

    /// Flattened, trimmed text cut to `limit` characters with an ellipsis.
    pub fn compact_text(&self, limit: usize) -> String {
        let flat = self.flattened_text();
        let trimmed = flat.trim();
        if trimmed.chars().count() > limit {
            let cut: String = trimmed.chars().take(limit).collect();
            format!("{}...", cut)
        } else {
            trimmed.to_string()
        }
    }
}

/// Score of the top-ranked chunk, if any.
pub fn top_score(chunks: &[EvidenceChunk]) -> Option<f64> {
    chunks.first().map(|c| c.score)
}

/// Distinct source identifiers in the evidence set.
pub fn distinct_sources(chunks: &[EvidenceChunk]) -> BTreeSet<&str> {
    chunks.iter().map(|c| c.source.as_str()).collect()
}

/// Number of distinct non-blank sources.
pub fn source_diversity(chunks: &[EvidenceChunk]) -> usize {
    chunks
        .iter()
        .filter(|c| !c.source.trim().is_empty())
        .map(|c| c.source.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Numbered, verbatim listing of every chunk: score, source, page and text.
pub fn render_verbatim(chunks: &[EvidenceChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] score={} source={} page={} evidence={}",
                i + 1,
                c.score,
                c.source,
                render_page(c.page),
                c.flattened_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Numbered listing with each chunk's text compacted to [`COMPACT_TEXT_LIMIT`].
pub fn render_compact(chunks: &[EvidenceChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "[{}] source={} page={} text={}",
                i + 1,
                c.source,
                render_page(c.page),
                c.compact_text(COMPACT_TEXT_LIMIT)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_page(page: Option<u32>) -> String {
    page.map(|p| p.to_string()).unwrap_or_else(|| "None".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_score_uses_first_ranked_chunk() {
        let chunks = vec![
            EvidenceChunk::new(0.6, "a.txt", "x"),
            EvidenceChunk::new(0.9, "b.txt", "y"),
        ];
        assert_eq!(top_score(&chunks), Some(0.6));
        assert_eq!(top_score(&[]), None);
    }

    #[test]
    fn test_compact_text_truncates_with_ellipsis() {
        let chunk = EvidenceChunk::new(0.8, "a.txt", "x".repeat(1000));
        let compact = chunk.compact_text(COMPACT_TEXT_LIMIT);
        assert_eq!(compact.len(), COMPACT_TEXT_LIMIT + 3);
        assert!(compact.ends_with("..."));

        let short = EvidenceChunk::new(0.8, "a.txt", "line one\nline two ");
        assert_eq!(short.compact_text(COMPACT_TEXT_LIMIT), "line one line two");
    }

    #[test]
    fn test_render_verbatim_numbers_chunks() {
        let chunks = vec![
            EvidenceChunk::new(0.91, "remote_work_v1.txt", "Employees may\nwork remotely.").with_page(2),
            EvidenceChunk::new(0.8, "remote_work_v1.txt", "Managers approve."),
        ];
        let listing = render_verbatim(&chunks);
        assert!(listing.starts_with("[1] score=0.91 source=remote_work_v1.txt page=2 evidence=Employees may work remotely."));
        assert!(listing.contains("[2] score=0.8 source=remote_work_v1.txt page=None"));
    }

    #[test]
    fn test_source_diversity_ignores_blank_sources() {
        let chunks = vec![
            EvidenceChunk::new(0.9, "a.txt", "x"),
            EvidenceChunk::new(0.8, "", "y"),
            EvidenceChunk::new(0.7, "b.txt", "z"),
            EvidenceChunk::new(0.6, "a.txt", "w"),
        ];
        assert_eq!(source_diversity(&chunks), 2);
        assert_eq!(distinct_sources(&chunks).len(), 3);
    }

    #[test]
    fn test_chunk_deserializes_retriever_id_alias() {
        let chunk: EvidenceChunk = serde_json::from_str(
            r#"{"score": 0.7, "source": "a.txt", "page": 3, "text": "t", "id": "a-3-0"}"#,
        )
        .unwrap();
        assert_eq!(chunk.chunk_id.as_deref(), Some("a-3-0"));
        assert_eq!(chunk.page, Some(3));
    }
}
