//! Indexing pipeline and retrieval path.

pub mod index_engine;
pub mod search;

pub use index_engine::{IndexEngine, IndexEngineConfig, IndexReport};
pub use search::Retriever;
