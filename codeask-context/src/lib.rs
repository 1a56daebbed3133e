pub mod text;

// Re-export the main chunking types for external use
pub use text::{ChunkConfig, TextChunk, TextChunker};
