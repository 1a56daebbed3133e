//! Vector store abstraction and its SQLite implementation.
//!
//! The store holds embedded chunks keyed by stable chunk id and answers
//! nearest-neighbour queries by cosine distance. The trait exists so the
//! SQLite backend can be swapped without touching the indexing pipeline
//! or the retrieval path.

pub mod sqlite_store;

pub use sqlite_store::SqliteStore;

use crate::error::IndexError;
use async_trait::async_trait;
use half::f16;
use std::collections::BTreeMap;

/// One embedded chunk as stored, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Stable id: `"{file_path}:{sequence}"`.
    pub chunk_id: String,
    /// Source file path, relative to the indexed root.
    pub file_path: String,
    /// 0-based ordinal within the file.
    pub sequence: usize,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
    /// blake3 hash (hex) of the whole source file this chunk came from.
    pub content_hash: String,
    /// Unit-length embedding.
    pub embedding: Vec<f16>,
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub file_path: String,
    pub line_start: usize,
    pub line_end: usize,
    pub content: String,
    /// Cosine distance (`1 - cosine similarity`); lower is closer.
    pub distance: f32,
}

/// Counts reported by [`VectorStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub files: usize,
    pub chunks: usize,
}

/// Persistent store of embedded chunks plus index metadata.
///
/// Writes are file-level atomic: a file's chunk set is always replaced
/// wholesale in one transaction, so readers never observe a half-updated file.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace all chunks of `file_path` with `chunks` in a single
    /// transaction. An empty slice just removes the file's chunks.
    async fn upsert_file_chunks(
        &self,
        file_path: &str,
        chunks: &[ChunkRecord],
    ) -> Result<(), IndexError>;

    /// Remove every chunk of a file. Returns the number of chunks removed.
    async fn delete_file(&self, file_path: &str) -> Result<usize, IndexError>;

    /// Top-`k` chunks by ascending cosine distance to `query_vector`, ties
    /// broken by ascending chunk id. Chunks whose stored embedding length
    /// differs from the query are skipped.
    async fn query(&self, query_vector: &[f16], k: usize) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Delete all chunks and index metadata in one transaction.
    async fn purge(&self) -> Result<(), IndexError>;

    /// Map of indexed file path to its recorded whole-file content hash,
    /// derived from the chunks table.
    async fn file_inventory(&self) -> Result<BTreeMap<String, String>, IndexError>;

    async fn stats(&self) -> Result<StoreStats, IndexError>;

    /// Fingerprint of the embedding configuration that built this store,
    /// if any indexing has happened yet.
    async fn embedding_fingerprint(&self) -> Result<Option<String>, IndexError>;

    async fn set_embedding_fingerprint(&self, fingerprint: &str) -> Result<(), IndexError>;
}

/// Cosine similarity between two vectors of equal length.
///
/// Stored and query vectors are unit-length, so this is a plain dot product
/// with a norm correction kept for safety against denormalized input.
pub(crate) fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 { dot / denom } else { 0.0 }
}
