//! Index manager: owns writes to the vector store.
//!
//! Re-ingestion policy: `upsert` deletes every existing chunk for the
//! document, then embeds and writes the new set in fixed-size batches. The
//! delete-then-write sequence for one `document_id` is a critical section —
//! a per-document async lock serializes conflicting upserts and deletes of
//! the same id, while independent documents proceed without coordination.
//!
//! A failure partway through the batch sequence surfaces as
//! [`Error::PartialWrite`] carrying the count of chunks already written and
//! the failing batch index, so the caller can retry from that point. No
//! chunk is ever silently dropped.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};
use crate::store::{VectorRecord, VectorStore};

/// Store-side batch limit; configured batch sizes are clamped to this.
const MAX_BATCH: usize = 100;

pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    doc_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.clamp(1, MAX_BATCH),
            doc_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the indexed chunks for `document` with `chunks`.
    ///
    /// Returns the number of chunks written. Empty input still clears any
    /// previously stored chunks for the document.
    ///
    /// Records are written without a fingerprint; the document fingerprint
    /// is stamped only after the last batch lands. A run that fails partway
    /// leaves the document looking stale, so a retry re-ingests it instead
    /// of skipping the surviving prefix as current.
    pub async fn upsert(&self, document: &Document, chunks: &[Chunk]) -> Result<usize> {
        let _guard = self.lock_document(&document.id).await;

        self.store.delete_document(&document.id).await?;

        let mut written = 0usize;

        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| partial(written, batch_index, e))?;

            if embeddings.len() != batch.len() {
                return Err(partial(
                    written,
                    batch_index,
                    Error::Embedding(format!(
                        "batch of {} texts produced {} embeddings",
                        batch.len(),
                        embeddings.len()
                    )),
                ));
            }

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorRecord {
                    chunk: chunk.clone(),
                    embedding,
                    fingerprint: String::new(),
                })
                .collect();

            self.store
                .upsert(&records)
                .await
                .map_err(|e| partial(written, batch_index, e))?;

            written += batch.len();
            tracing::debug!(document = %document.id, batch = batch_index, written, "batch written");
        }

        self.store
            .set_fingerprint(&document.id, &fingerprint(&document.text))
            .await?;

        Ok(written)
    }

    /// Remove all chunks for a document. Returns the count removed.
    pub async fn delete(&self, document_id: &str) -> Result<usize> {
        let _guard = self.lock_document(document_id).await;
        self.store.delete_document(document_id).await
    }

    /// True when the store already holds this exact document version.
    pub async fn is_current(&self, document: &Document) -> Result<bool> {
        let stored = self.store.fingerprint(&document.id).await?;
        Ok(stored.as_deref() == Some(fingerprint(&document.text).as_str()))
    }

    async fn lock_document(&self, document_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.doc_locks.lock().await;
            // A strong count of 1 means no guard is held and no task is
            // waiting, so the entry can go; keeps the map from growing
            // one entry per document ever ingested.
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn lock_table_len(&self) -> usize {
        self.doc_locks.lock().await.len()
    }
}

fn partial(written: usize, batch_index: usize, source: Error) -> Error {
    Error::PartialWrite {
        written,
        batch_index,
        source: Box::new(source),
    }
}

/// Content fingerprint of a document's text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::chunk::chunk_document;
    use crate::store::memory::MemoryStore;
    use crate::store::StoreHit;

    /// Deterministic embedder: one dimension per letter bucket.
    struct BucketEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BucketEmbedder {
        fn model_name(&self) -> &str {
            "bucket-test"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 8];
                    for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                        v[(c.to_ascii_lowercase() as usize - 'a' as usize) % 8] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    /// Store wrapper that fails upsert calls whose index falls in
    /// `fail_from..fail_to`; everything else passes through.
    struct FlakyStore {
        inner: MemoryStore,
        fail_from: usize,
        fail_to: usize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn failing_from(fail_from: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_from,
                fail_to: usize::MAX,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_once_at(call: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_from: call,
                fail_to: call + 1,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from && call < self.fail_to {
                return Err(Error::RetrievalUnavailable("store went away".into()));
            }
            self.inner.upsert(records).await
        }

        async fn delete_document(&self, document_id: &str) -> Result<usize> {
            self.inner.delete_document(document_id).await
        }

        async fn query(
            &self,
            embedding: &[f32],
            k: usize,
            filters: Option<&BTreeMap<String, String>>,
        ) -> Result<Vec<StoreHit>> {
            self.inner.query(embedding, k, filters).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn fingerprint(&self, document_id: &str) -> Result<Option<String>> {
            self.inner.fingerprint(document_id).await
        }

        async fn set_fingerprint(&self, document_id: &str, fingerprint: &str) -> Result<()> {
            self.inner.set_fingerprint(document_id, fingerprint).await
        }

        async fn scan(
            &self,
            filters: Option<&BTreeMap<String, String>>,
        ) -> Result<Vec<crate::models::Chunk>> {
            self.inner.scan(filters).await
        }
    }

    fn doc(id: &str, text: &str) -> Document {
        Document::new(id, text)
    }

    async fn upsert_doc(manager: &IndexManager, document: &Document) -> Result<usize> {
        let chunks = chunk_document(document, 50, 10).unwrap();
        manager.upsert(document, &chunks).await
    }

    #[tokio::test]
    async fn test_upsert_writes_every_chunk() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store.clone(), Arc::new(BucketEmbedder), 2);

        let document = doc("d1", &"alpha beta gamma delta ".repeat(10));
        let written = upsert_doc(&manager, &document).await.unwrap();
        assert!(written > 1);
        assert_eq!(store.count().await.unwrap(), written);
    }

    #[tokio::test]
    async fn test_reingestion_replaces_stale_chunks() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store.clone(), Arc::new(BucketEmbedder), 10);

        let old = doc("d1", &"old old old content here ".repeat(20));
        upsert_doc(&manager, &old).await.unwrap();

        let new = doc("d1", "fresh text");
        let written = upsert_doc(&manager, &new).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.query(&[1.0; 8], 10, None).await.unwrap();
        assert!(hits.iter().all(|h| !h.chunk.text.contains("old")));
    }

    #[tokio::test]
    async fn test_idempotent_reingestion_keeps_fingerprint() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store.clone(), Arc::new(BucketEmbedder), 10);

        let document = doc("d1", "same text both times");
        upsert_doc(&manager, &document).await.unwrap();
        assert!(manager.is_current(&document).await.unwrap());

        upsert_doc(&manager, &document).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(manager.is_current(&document).await.unwrap());

        let edited = doc("d1", "different text now");
        assert!(!manager.is_current(&edited).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_write_reports_progress() {
        let store = Arc::new(FlakyStore::failing_from(2));
        let manager = IndexManager::new(store, Arc::new(BucketEmbedder), 1);

        // 4 chunks at batch size 1: batches 0 and 1 land, batch 2 fails.
        let document = doc("d1", &"a".repeat(170));
        let chunks = chunk_document(&document, 50, 10).unwrap();
        assert_eq!(chunks.len(), 4);

        let err = manager.upsert(&document, &chunks).await.unwrap_err();
        match err {
            Error::PartialWrite {
                written,
                batch_index,
                ..
            } => {
                assert_eq!(written, 2);
                assert_eq!(batch_index, 2);
            }
            other => panic!("expected PartialWrite, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_partial_write_leaves_document_stale_and_retryable() {
        let store = Arc::new(FlakyStore::failing_once_at(1));
        let manager = IndexManager::new(store.clone(), Arc::new(BucketEmbedder), 1);

        let document = doc("d1", &"a".repeat(170));
        let chunks = chunk_document(&document, 50, 10).unwrap();
        assert_eq!(chunks.len(), 4);

        let err = manager.upsert(&document, &chunks).await.unwrap_err();
        match err {
            Error::PartialWrite { written, .. } => assert_eq!(written, 1),
            other => panic!("expected PartialWrite, got {:?}", other),
        }

        // The surviving prefix must not make the document look current,
        // or a rerun would skip it and never repair the index.
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(!manager.is_current(&document).await.unwrap());

        // A rerun replaces the prefix with the full chunk set.
        let written = manager.upsert(&document, &chunks).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(store.count().await.unwrap(), 4);
        assert!(manager.is_current(&document).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_same_document_never_mix_versions() {
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(IndexManager::new(
            store.clone(),
            Arc::new(BucketEmbedder),
            1,
        ));

        let old = doc("d1", &"alpha version of the document text ".repeat(6));
        let new = doc("d1", &"bravo rewrite with other words entirely ".repeat(8));
        let old_chunks = chunk_document(&old, 50, 10).unwrap();
        let new_chunks = chunk_document(&new, 50, 10).unwrap();
        assert_ne!(old_chunks.len(), new_chunks.len());

        let m1 = manager.clone();
        let (d1, c1) = (old.clone(), old_chunks.clone());
        let t1 = tokio::spawn(async move { m1.upsert(&d1, &c1).await });
        let m2 = manager.clone();
        let (d2, c2) = (new.clone(), new_chunks.clone());
        let t2 = tokio::spawn(async move { m2.upsert(&d2, &c2).await });

        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();

        // The per-document lock serializes the two replaces, so the store
        // must hold exactly one complete version, never a blend.
        let stored = store.scan(None).await.unwrap();
        let alpha = stored.iter().filter(|c| c.text.contains("alpha")).count();
        let bravo = stored.iter().filter(|c| c.text.contains("bravo")).count();
        assert!(
            (alpha == old_chunks.len() && bravo == 0)
                || (bravo == new_chunks.len() && alpha == 0),
            "mixed chunk set: {} alpha, {} bravo",
            alpha,
            bravo
        );
        assert_eq!(stored.len(), alpha + bravo);
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow_unbounded() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store, Arc::new(BucketEmbedder), 10);

        for i in 0..20 {
            let document = doc(&format!("d{}", i), "a few words to index");
            upsert_doc(&manager, &document).await.unwrap();
        }

        // Acquiring any lock prunes entries with no holder or waiter.
        manager.delete("d0").await.unwrap();
        assert_eq!(manager.lock_table_len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_returns_removed_count() {
        let store = Arc::new(MemoryStore::new());
        let manager = IndexManager::new(store, Arc::new(BucketEmbedder), 10);

        let document = doc("d1", &"some words to index ".repeat(10));
        let written = upsert_doc(&manager, &document).await.unwrap();
        assert_eq!(manager.delete("d1").await.unwrap(), written);
        assert_eq!(manager.delete("d1").await.unwrap(), 0);
    }
}
