//! Core data types that flow through the ingestion and query pipelines.
//!
//! [`Document`] and [`Chunk`] are created at ingestion time and persisted
//! (through the vector store) until the same source is re-ingested.
//! [`RetrievalHit`], [`Context`], and the answer types are transient and
//! scoped to a single query.

use std::collections::BTreeMap;

use serde::Serialize;

/// Normalized representation of ingestible content.
///
/// `id` is deterministic from the source's natural key (relative file path,
/// task GID), which makes re-ingestion idempotent: the same source always
/// maps to the same document, and its chunks replace the previous set.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A bounded, overlap-aware window of a document's text — the unit of
/// embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `{document_id}:{chunk_index}`, deterministic for a given input.
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    /// Start position of this window in the source text, in chars.
    pub offset: usize,
    pub text: String,
    /// Inherited document metadata plus chunk bookkeeping.
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Length of the chunk text in chars (the unit all budgets use).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A ranked chunk returned from the retriever. Never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    /// Similarity score; higher is more relevant.
    pub score: f32,
    /// Zero-based position after ordering.
    pub rank: usize,
}

/// One included hit inside an assembled [`Context`], with its citation label.
#[derive(Debug, Clone)]
pub struct ContextSegment {
    pub hit: RetrievalHit,
    pub citation: String,
}

/// The size-bounded, deduplicated set of retrieved chunks handed to
/// generation. Total text length never exceeds the configured budget.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub segments: Vec<ContextSegment>,
    pub total_chars: usize,
}

impl Context {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Citation labels in segment order, one per included hit.
    pub fn citations(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.citation.clone()).collect()
    }
}

/// A generated answer with the citations that were actually in the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<String>,
}

/// Retrieval-only outcome used when no generation endpoint is configured.
///
/// This is a valid success: retrieval worked and its result is surfaced.
#[derive(Debug, Clone)]
pub struct DegradedResponse {
    pub context: Context,
    pub explanation: String,
}

/// Result of asking a question: either a synthesized answer or the raw
/// retrieved context.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    Answered(Answer),
    Degraded(DegradedResponse),
}
