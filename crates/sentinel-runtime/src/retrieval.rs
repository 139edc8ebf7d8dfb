//! Retrieval contract.
//!
//! The vector index lives outside this workspace. The pipeline only needs
//! `retrieve(query, top_k)` returning chunks ranked by descending score.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use sentinel_core::EvidenceChunk;

/// Errors from a retrieval collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("Failed to load evidence from {path}: {message}")]
    Load { path: String, message: String },
}

impl RetrievalError {
    pub fn kind(&self) -> &'static str {
        match self {
            RetrievalError::Unavailable(_) => "RetrievalUnavailable",
            RetrievalError::InvalidEvidence(_) => "InvalidEvidence",
            RetrievalError::Load { .. } => "EvidenceLoadError",
        }
    }
}

/// Source of ranked evidence for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` chunks, ranked by descending score.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<EvidenceChunk>, RetrievalError>;

    fn name(&self) -> &str;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EvidenceFile {
    Chunks(Vec<EvidenceChunk>),
    Wrapped { chunks: Vec<EvidenceChunk> },
}

/// Serves a fixed, pre-retrieved evidence set regardless of the query.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    chunks: Vec<EvidenceChunk>,
}

impl StaticRetriever {
    /// Chunks are ranked by descending score on construction.
    pub fn new(mut chunks: Vec<EvidenceChunk>) -> Self {
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self { chunks }
    }

    /// Parse either a JSON array of chunks or an object with a `chunks` array.
    pub fn from_json_str(json: &str) -> Result<Self, RetrievalError> {
        let parsed: EvidenceFile =
            serde_json::from_str(json).map_err(|e| RetrievalError::InvalidEvidence(e.to_string()))?;
        let chunks = match parsed {
            EvidenceFile::Chunks(chunks) | EvidenceFile::Wrapped { chunks } => chunks,
        };
        Ok(Self::new(chunks))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RetrievalError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    pub fn chunks(&self) -> &[EvidenceChunk] {
        &self.chunks
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        tracing::debug!(query_len = query.len(), top_k, "Serving static evidence");
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ranks_and_truncates() {
        let retriever = StaticRetriever::new(vec![
            EvidenceChunk::new(0.5, "c.txt", "c"),
            EvidenceChunk::new(0.9, "a.txt", "a"),
            EvidenceChunk::new(0.7, "b.txt", "b"),
        ]);

        let chunks = retriever.retrieve("anything", 2).await.unwrap();
        let sources: Vec<_> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, ["a.txt", "b.txt"]);
    }

    #[test]
    fn test_loads_array_and_wrapped_forms() {
        let array = r#"[{"score": 0.8, "source": "a.txt", "text": "x", "page": 2}]"#;
        let wrapped = r#"{"chunks": [{"score": 0.8, "source": "a.txt", "text": "x", "id": "a-1"}]}"#;

        let from_array = StaticRetriever::from_json_str(array).unwrap();
        assert_eq!(from_array.chunks()[0].page, Some(2));

        let from_wrapped = StaticRetriever::from_json_str(wrapped).unwrap();
        assert_eq!(from_wrapped.chunks()[0].chunk_id.as_deref(), Some("a-1"));
    }

    #[test]
    fn test_rejects_malformed_evidence() {
        let err = StaticRetriever::from_json_str(r#"{"items": []}"#).unwrap_err();
        assert_eq!(err.kind(), "InvalidEvidence");

        let err = StaticRetriever::from_json_file("/nonexistent/evidence.json").unwrap_err();
        assert_eq!(err.kind(), "EvidenceLoadError");
    }
}
