//! Retriever: question → ranked chunks.
//!
//! Embeds the query, asks the store for the nearest chunks, and produces
//! [`RetrievalHit`]s in descending similarity order. Ties keep the store's
//! insertion order (stable sort), so results are deterministic for a fixed
//! index. An unreachable store — or one with nothing ingested yet — is
//! [`Error::RetrievalUnavailable`]; a valid query that simply matches
//! nothing returns an empty vector.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::RetrievalHit;
use crate::store::VectorStore;

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Return up to `k` hits for `query`, best first.
    ///
    /// `filters` restricts candidates by metadata equality (for example
    /// `source_type = "tracker"`). Fewer than `k` hits is not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<RetrievalHit>> {
        let indexed = self
            .store
            .count()
            .await
            .map_err(|e| Error::RetrievalUnavailable(format!("vector store unreachable: {}", e)))?;

        if indexed == 0 {
            return Err(Error::RetrievalUnavailable(
                "the index holds no chunks; ingest something first".into(),
            ));
        }

        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| Error::RetrievalUnavailable(format!("query embedding failed: {}", e)))?;

        let mut hits = self
            .store
            .query(&query_vec, k, filters)
            .await
            .map_err(|e| Error::RetrievalUnavailable(format!("vector query failed: {}", e)))?;

        // Stores already order by score, but the contract lives here:
        // stable sort keeps insertion order on score ties.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| RetrievalHit {
                chunk: hit.chunk,
                score: hit.score,
                rank,
            })
            .collect())
    }
}
