//! # codeask-retriever
//!
//! Incremental indexing and semantic retrieval over a local source tree,
//! plus the named conversation sessions the console builds on.
//!
//! ## Architecture
//!
//! - [`storage`]: the [`storage::VectorStore`] trait and its SQLite
//!   implementation. Chunks are stored with normalized f16 embeddings and
//!   queried by cosine distance.
//! - [`retrieval`]: the [`retrieval::IndexEngine`] (hash-diff reindexing over
//!   an `ignore`-aware walk) and the [`retrieval::Retriever`] (question to
//!   top-k chunks).
//! - [`session`]: named sessions with sliding-window history and per-session
//!   runtime overrides, persisted in the same database.
//! - [`testing`]: deterministic embedding providers for tests.
//!
//! The embedding provider itself lives in `codeask-embed`; everything here is
//! generic over the [`codeask_embed::EmbeddingProvider`] trait.

pub mod error;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod testing;

pub use error::{IndexError, SessionError};
pub use retrieval::{IndexEngine, IndexEngineConfig, IndexReport, Retriever};
pub use session::{ContextManager, Message};
pub use storage::{ChunkRecord, ScoredChunk, SqliteStore, StoreStats, VectorStore};
