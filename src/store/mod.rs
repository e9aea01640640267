//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the boundary to the persistent embedding
//! index: everything durable lives behind it. Components receive a store at
//! construction (never through ambient state), which is what lets the test
//! suite substitute [`memory::MemoryStore`] for the SQLite-backed store.
//!
//! Implementations must serialize conflicting writes for the same
//! `document_id`; reads take no locks and may run concurrently with writes.

pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Chunk;

/// One chunk plus its embedding, ready to be written to the store.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// Content fingerprint of the whole source document, shared by all of
    /// its chunks. Used to skip re-ingesting unchanged sources. The index
    /// manager writes records with an empty fingerprint and stamps the real
    /// one via [`VectorStore::set_fingerprint`] only once the document's
    /// full chunk set is durably written, so a partially written document
    /// never looks current.
    pub fingerprint: String,
}

/// A raw nearest-neighbor match before ranking.
#[derive(Debug, Clone)]
pub struct StoreHit {
    pub chunk: Chunk,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write or overwrite records, keyed by `chunk_id`.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Remove every chunk belonging to a document. Returns the count removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Nearest-neighbor query with optional metadata equality filters.
    ///
    /// Returns up to `k` hits in descending similarity order; equal scores
    /// keep chunk insertion (write) order.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<StoreHit>>;

    /// Total number of indexed chunks.
    async fn count(&self) -> Result<usize>;

    /// The stored fingerprint for a document, if any of its chunks exist.
    async fn fingerprint(&self, document_id: &str) -> Result<Option<String>>;

    /// Stamp the fingerprint on every stored chunk of a document.
    async fn set_fingerprint(&self, document_id: &str, fingerprint: &str) -> Result<()>;

    /// Every stored chunk matching the filters, in insertion order. A full
    /// non-semantic read, used for corpus-wide reporting.
    async fn scan(&self, filters: Option<&BTreeMap<String, String>>) -> Result<Vec<Chunk>>;
}

/// True when every filter key is present in `metadata` with an equal value.
pub(crate) fn matches_filters(
    metadata: &BTreeMap<String, String>,
    filters: Option<&BTreeMap<String, String>>,
) -> bool {
    match filters {
        None => true,
        Some(wanted) => wanted
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|have| have == v)),
    }
}
