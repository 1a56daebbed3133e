//! SQLite-backed vector store.
//!
//! One database file (`.codeask.db`) holds the embedded chunks, the index
//! metadata, and the conversation sessions (see [`crate::session`]); the pool
//! opened here is shared across all of them.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE chunks (
//!     chunk_id     TEXT PRIMARY KEY,   -- "{file_path}:{sequence}"
//!     file_path    TEXT NOT NULL,
//!     sequence     INTEGER NOT NULL,
//!     line_start   INTEGER NOT NULL,
//!     line_end     INTEGER NOT NULL,
//!     content      TEXT NOT NULL,
//!     content_hash TEXT NOT NULL,      -- blake3 of the whole file, hex
//!     embedding    BLOB NOT NULL,      -- normalized f16, little-endian
//!     created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE index_metadata (
//!     key   TEXT PRIMARY KEY,
//!     value TEXT NOT NULL
//! );
//! ```
//!
//! ## SQLite configuration
//!
//! - WAL mode for concurrent reads during indexing
//! - 64KB pages, sized for embedding blobs
//! - foreign keys on (session messages cascade on session delete)

use super::{ChunkRecord, ScoredChunk, StoreStats, VectorStore, cosine_similarity};
use crate::error::IndexError;
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

const FINGERPRINT_KEY: &str = "embedding_fingerprint";

/// SQLite implementation of [`VectorStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `data_dir/.codeask.db`.
    pub async fn open(data_dir: &Path) -> Result<Self, IndexError> {
        let db_path = data_dir.join(".codeask.db");

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// In-memory database for tests.
    pub async fn open_memory() -> Result<Self, IndexError> {
        // A single connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id     TEXT PRIMARY KEY,
                file_path    TEXT NOT NULL,
                sequence     INTEGER NOT NULL,
                line_start   INTEGER NOT NULL,
                line_end     INTEGER NOT NULL,
                content      TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_path ON chunks(file_path)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_metadata (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// The shared connection pool; the session layer reuses it.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_file_chunks(
        &self,
        file_path: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE file_path = ?1")
            .bind(file_path)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let embedding_bytes = bytemuck::cast_slice::<f16, u8>(&chunk.embedding);
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, file_path, sequence, line_start, line_end, content, content_hash, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.file_path)
            .bind(chunk.sequence as i64)
            .bind(chunk.line_start as i64)
            .bind(chunk.line_end as i64)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_file(&self, file_path: &str) -> Result<usize, IndexError> {
        let result = sqlx::query("DELETE FROM chunks WHERE file_path = ?1")
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn query(&self, query_vector: &[f16], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, file_path, line_start, line_end, content, embedding FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let embedding = bytemuck::cast_slice::<u8, f16>(&embedding_bytes);
            if embedding.len() != query_vector.len() {
                continue;
            }

            let line_start: i64 = row.get("line_start");
            let line_end: i64 = row.get("line_end");
            scored.push(ScoredChunk {
                chunk_id: row.get("chunk_id"),
                file_path: row.get("file_path"),
                line_start: line_start as usize,
                line_end: line_end as usize,
                content: row.get("content"),
                distance: 1.0 - cosine_similarity(query_vector, embedding),
            });
        }

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn purge(&self) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_metadata")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn file_inventory(&self) -> Result<BTreeMap<String, String>, IndexError> {
        let rows =
            sqlx::query("SELECT file_path, content_hash FROM chunks GROUP BY file_path")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("file_path"), row.get("content_hash")))
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, IndexError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS chunks, COUNT(DISTINCT file_path) AS files FROM chunks",
        )
        .fetch_one(&self.pool)
        .await?;

        let chunks: i64 = row.get("chunks");
        let files: i64 = row.get("files");
        Ok(StoreStats {
            files: files as usize,
            chunks: chunks as usize,
        })
    }

    async fn embedding_fingerprint(&self) -> Result<Option<String>, IndexError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM index_metadata WHERE key = ?1",
        )
        .bind(FINGERPRINT_KEY)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_embedding_fingerprint(&self, fingerprint: &str) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            INSERT INTO index_metadata (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(FINGERPRINT_KEY)
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn record(file_path: &str, sequence: usize, embedding: &[f32]) -> ChunkRecord {
        ChunkRecord {
            chunk_id: format!("{file_path}:{sequence}"),
            file_path: file_path.to_string(),
            sequence,
            line_start: sequence * 10,
            line_end: sequence * 10 + 10,
            content: format!("content of {file_path} chunk {sequence}"),
            content_hash: "deadbeef".to_string(),
            embedding: embedding.iter().copied().map(f16::from_f32).collect(),
        }
    }

    fn q(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    #[tokio::test]
    async fn test_upsert_replaces_file_chunks_wholesale() -> Result<()> {
        let store = SqliteStore::open_memory().await?;

        store
            .upsert_file_chunks(
                "a.rs",
                &[record("a.rs", 0, &[1.0, 0.0]), record("a.rs", 1, &[0.0, 1.0])],
            )
            .await?;
        assert_eq!(store.stats().await?.chunks, 2);

        // Re-upserting with one chunk drops the old second chunk.
        store
            .upsert_file_chunks("a.rs", &[record("a.rs", 0, &[1.0, 0.0])])
            .await?;
        let stats = store.stats().await?;
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.files, 1);

        // Empty slice removes the file entirely.
        store.upsert_file_chunks("a.rs", &[]).await?;
        assert_eq!(store.stats().await?.chunks, 0);
        assert!(store.file_inventory().await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_with_id_tiebreak() -> Result<()> {
        let store = SqliteStore::open_memory().await?;

        store
            .upsert_file_chunks("far.rs", &[record("far.rs", 0, &[0.0, 1.0])])
            .await?;
        // Two chunks at identical distance from the query.
        store
            .upsert_file_chunks(
                "near.rs",
                &[record("near.rs", 0, &[1.0, 0.0]), record("near.rs", 1, &[1.0, 0.0])],
            )
            .await?;

        let results = store.query(&q(&[1.0, 0.0]), 2).await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "near.rs:0");
        assert_eq!(results[1].chunk_id, "near.rs:1");
        assert!(results[0].distance < 0.01);

        let all = store.query(&q(&[1.0, 0.0]), 10).await?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].file_path, "far.rs");
        assert!(all[2].distance > all[0].distance);

        Ok(())
    }

    #[tokio::test]
    async fn test_query_skips_mismatched_dimensions() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        store
            .upsert_file_chunks("a.rs", &[record("a.rs", 0, &[1.0, 0.0, 0.0])])
            .await?;

        let results = store.query(&q(&[1.0, 0.0]), 5).await?;
        assert!(results.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_file_reports_removed_count() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        store
            .upsert_file_chunks(
                "a.rs",
                &[record("a.rs", 0, &[1.0, 0.0]), record("a.rs", 1, &[0.0, 1.0])],
            )
            .await?;

        assert_eq!(store.delete_file("a.rs").await?, 2);
        assert_eq!(store.delete_file("a.rs").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fingerprint_roundtrip_and_purge() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        assert_eq!(store.embedding_fingerprint().await?, None);

        store.set_embedding_fingerprint("local:model:384:cosine").await?;
        assert_eq!(
            store.embedding_fingerprint().await?.as_deref(),
            Some("local:model:384:cosine")
        );

        store
            .upsert_file_chunks("a.rs", &[record("a.rs", 0, &[1.0, 0.0])])
            .await?;
        store.purge().await?;

        assert_eq!(store.stats().await?, StoreStats::default());
        assert_eq!(store.embedding_fingerprint().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_inventory_maps_paths_to_hashes() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let mut chunk = record("b.rs", 0, &[1.0, 0.0]);
        chunk.content_hash = "cafef00d".to_string();
        store.upsert_file_chunks("b.rs", &[chunk]).await?;

        let inventory = store.file_inventory().await?;
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get("b.rs").map(String::as_str), Some("cafef00d"));
        Ok(())
    }
}
