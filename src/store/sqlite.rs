//! SQLite-backed [`VectorStore`] — the durable index.
//!
//! One `chunks` table holds chunk text, metadata (JSON), and the embedding
//! as a little-endian f32 BLOB. The database runs in WAL mode so queries
//! proceed while an ingestion run writes. Each `upsert` call is a single
//! transaction, which makes batch boundaries clean retry points.
//!
//! Similarity queries load candidate rows in rowid (insertion) order and
//! score them with brute-force cosine similarity; nearest-neighbor index
//! structures are out of scope for a local corpus of this size.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::Result;
use crate::models::Chunk;

use super::{matches_filters, StoreHit, VectorRecord, VectorStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id      TEXT PRIMARY KEY,
    document_id   TEXT NOT NULL,
    chunk_index   INTEGER NOT NULL,
    start_offset  INTEGER NOT NULL,
    text          TEXT NOT NULL,
    metadata_json TEXT NOT NULL,
    embedding     BLOB NOT NULL,
    fingerprint   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists. Idempotent.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, document_id, chunk_index, start_offset, text, metadata_json, embedding, fingerprint)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    start_offset = excluded.start_offset,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    fingerprint = excluded.fingerprint
                "#,
            )
            .bind(&record.chunk.chunk_id)
            .bind(&record.chunk.document_id)
            .bind(record.chunk.chunk_index as i64)
            .bind(record.chunk.offset as i64)
            .bind(&record.chunk.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.embedding))
            .bind(&record.fingerprint)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filters: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<StoreHit>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, start_offset, text, metadata_json, embedding \
             FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in rows {
            let metadata: BTreeMap<String, String> =
                serde_json::from_str(row.get::<&str, _>("metadata_json"))?;
            if !matches_filters(&metadata, filters) {
                continue;
            }

            let vector = blob_to_vec(row.get::<&[u8], _>("embedding"));
            hits.push(StoreHit {
                chunk: Chunk {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    offset: row.get::<i64, _>("start_offset") as usize,
                    text: row.get("text"),
                    metadata,
                },
                score: cosine_similarity(embedding, &vector),
            });
        }

        // Rows arrive in rowid order, so a stable sort keeps insertion
        // order for equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn fingerprint(&self, document_id: &str) -> Result<Option<String>> {
        let fp: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM chunks WHERE document_id = ? LIMIT 1")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(fp)
    }

    async fn set_fingerprint(&self, document_id: &str, fingerprint: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET fingerprint = ? WHERE document_id = ?")
            .bind(fingerprint)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn scan(&self, filters: Option<&BTreeMap<String, String>>) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, chunk_index, start_offset, text, metadata_json \
             FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::new();
        for row in rows {
            let metadata: BTreeMap<String, String> =
                serde_json::from_str(row.get::<&str, _>("metadata_json"))?;
            if !matches_filters(&metadata, filters) {
                continue;
            }
            chunks.push(Chunk {
                chunk_id: row.get("chunk_id"),
                document_id: row.get("document_id"),
                chunk_index: row.get::<i64, _>("chunk_index") as usize,
                offset: row.get::<i64, _>("start_offset") as usize,
                text: row.get("text"),
                metadata,
            });
        }
        Ok(chunks)
    }
}
