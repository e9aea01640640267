//! Ingestion pipeline: loader → chunker → index manager.
//!
//! Per-document failures are contained: an unreadable source is logged and
//! counted, an empty document is a logged no-op, and an unchanged document
//! (same content fingerprint as the stored version) is skipped without
//! re-embedding. Store or embedding failures are not contained — they
//! propagate with partial-progress information so the caller can decide
//! whether to retry, and a run cancels cleanly at that batch boundary.

use crate::chunk::chunk_document;
use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::index::IndexManager;
use crate::loader_tracker::TrackerLoader;
use crate::models::Document;

/// Counts for one ingestion run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    /// Documents chunked, embedded, and written.
    pub documents: usize,
    pub chunks_written: usize,
    /// Documents already indexed at this exact content version.
    pub unchanged: usize,
    /// Empty documents, logged as no-ops.
    pub skipped: usize,
    /// Documents the loader could not produce.
    pub failed: usize,
}

/// Ingest every document from a synchronous loader (filesystem).
pub async fn ingest_documents<I>(
    manager: &IndexManager,
    chunking: &ChunkingConfig,
    documents: I,
) -> Result<IngestReport>
where
    I: IntoIterator<Item = Result<Document>>,
{
    let mut report = IngestReport::default();
    for item in documents {
        ingest_one(manager, chunking, &mut report, item).await?;
    }
    Ok(report)
}

/// Ingest every document from the paginated tracker loader.
pub async fn ingest_tracker(
    manager: &IndexManager,
    chunking: &ChunkingConfig,
    loader: &mut TrackerLoader,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    loop {
        match loader.next_document().await {
            Ok(Some(doc)) => ingest_one(manager, chunking, &mut report, Ok(doc)).await?,
            Ok(None) => break,
            // A page-level failure means the remaining sequence is gone;
            // it is not a single-document skip.
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

async fn ingest_one(
    manager: &IndexManager,
    chunking: &ChunkingConfig,
    report: &mut IngestReport,
    item: Result<Document>,
) -> Result<()> {
    let doc = match item {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable document");
            report.failed += 1;
            return Ok(());
        }
    };

    if doc.text.is_empty() {
        tracing::info!(document = %doc.id, "empty document, nothing to index");
        report.skipped += 1;
        return Ok(());
    }

    if manager.is_current(&doc).await? {
        tracing::debug!(document = %doc.id, "unchanged since last ingestion");
        report.unchanged += 1;
        return Ok(());
    }

    let chunks = chunk_document(&doc, chunking.max_chars, chunking.overlap_chars)?;
    let written = manager.upsert(&doc, &chunks).await?;

    report.documents += 1;
    report.chunks_written += written;
    tracing::info!(document = %doc.id, chunks = written, "indexed");
    Ok(())
}
