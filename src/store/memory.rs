//! In-memory [`VectorStore`] used by the test suite.
//!
//! Records live in a `Vec` behind an `RwLock`, so iteration order is chunk
//! write order. Queries are brute-force cosine similarity over all stored
//! vectors, which keeps the ordering contract easy to reason about in tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::store::Chunk;

use super::{matches_filters, StoreHit, VectorRecord, VectorStore};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        for record in records {
            stored.retain(|r| r.chunk.chunk_id != record.chunk.chunk_id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut stored = self.records.write().unwrap();
        let before = stored.len();
        stored.retain(|r| r.chunk.document_id != document_id);
        Ok(before - stored.len())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<StoreHit>> {
        let stored = self.records.read().unwrap();
        let mut hits: Vec<StoreHit> = stored
            .iter()
            .filter(|r| matches_filters(&r.chunk.metadata, filters))
            .map(|r| StoreHit {
                chunk: r.chunk.clone(),
                score: cosine_similarity(embedding, &r.embedding),
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap().len())
    }

    async fn fingerprint(&self, document_id: &str) -> Result<Option<String>> {
        let stored = self.records.read().unwrap();
        Ok(stored
            .iter()
            .find(|r| r.chunk.document_id == document_id)
            .map(|r| r.fingerprint.clone()))
    }

    async fn set_fingerprint(&self, document_id: &str, fingerprint: &str) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        for record in stored.iter_mut() {
            if record.chunk.document_id == document_id {
                record.fingerprint = fingerprint.to_string();
            }
        }
        Ok(())
    }

    async fn scan(&self, filters: Option<&BTreeMap<String, String>>) -> Result<Vec<Chunk>> {
        let stored = self.records.read().unwrap();
        Ok(stored
            .iter()
            .filter(|r| matches_filters(&r.chunk.metadata, filters))
            .map(|r| r.chunk.clone())
            .collect())
    }
}
