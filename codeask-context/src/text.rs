//! Deterministic line-window chunking for source files.
//!
//! Files are split into overlapping windows of whole lines so that every chunk
//! is bounded in size and consecutive chunks share a fixed amount of context
//! across the boundary. The same input text always produces the same sequence
//! of chunks: chunk identity (file path + ordinal) and the file-hash change
//! detection built on top of it both depend on that.
//!
//! # Usage
//!
//! ```
//! use codeask_context::{ChunkConfig, TextChunker};
//!
//! let chunker = TextChunker::new(ChunkConfig::default());
//! let chunks = chunker.chunk("src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n");
//!
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].sequence, 0);
//! assert_eq!(chunks[0].chunk_id(), "src/main.rs:0");
//! ```

use serde::Serialize;

/// Configuration for the line-window chunker.
///
/// All three knobs are deliberately configuration rather than constants baked
/// into call sites; the defaults suit source code and prose alike.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum number of lines per chunk.
    pub max_chunk_lines: usize,
    /// Number of trailing lines repeated at the start of the next chunk.
    /// Values at or above `max_chunk_lines` are clamped so every window
    /// still advances by at least one line.
    pub overlap_lines: usize,
    /// Hard byte cap per chunk, applied after line windowing. Protects
    /// against pathological single-line files (minified JS, data dumps).
    pub max_chunk_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_lines: 64,
            overlap_lines: 8,
            max_chunk_bytes: 4096,
        }
    }
}

impl ChunkConfig {
    pub fn with_max_chunk_lines(mut self, lines: usize) -> Self {
        self.max_chunk_lines = lines;
        self
    }

    pub fn with_overlap_lines(mut self, lines: usize) -> Self {
        self.overlap_lines = lines;
        self
    }
}

/// A single segment of a file: the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct TextChunk {
    /// Path of the source file, relative to the indexed root.
    pub path: String,
    /// 0-based ordinal of this chunk within the file.
    pub sequence: usize,
    /// First line covered by this chunk (0-based).
    pub line_start: usize,
    /// One past the last line covered (exclusive).
    pub line_end: usize,
    /// The chunk text.
    pub text: String,
}

impl TextChunk {
    /// Stable identifier derived from the file path and ordinal.
    ///
    /// Two runs over identical file content produce identical ids, which is
    /// what lets the store replace a file's chunks wholesale on change.
    pub fn chunk_id(&self) -> String {
        format!("{}:{}", self.path, self.sequence)
    }
}

/// Splits file text into bounded, overlapping line windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Chunk `content` into overlapping line windows.
    ///
    /// An empty or whitespace-only file yields zero chunks. The final window
    /// is emitted only when it contains at least one line not already covered
    /// by the previous window, so overlap never manufactures a trailing
    /// duplicate chunk.
    pub fn chunk(&self, path: &str, content: &str) -> Vec<TextChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = content.lines().collect();
        // Clamped so an overlap at or above the window size cannot stall
        // the walk or underflow.
        let step = self
            .config
            .max_chunk_lines
            .saturating_sub(self.config.overlap_lines)
            .max(1);

        let mut chunks = Vec::new();
        let mut line_start = 0;
        while line_start < lines.len() {
            let line_end = (line_start + self.config.max_chunk_lines).min(lines.len());
            let text = truncate_to_boundary(
                &lines[line_start..line_end].join("\n"),
                self.config.max_chunk_bytes,
            );
            if !text.trim().is_empty() {
                chunks.push(TextChunk {
                    path: path.to_string(),
                    sequence: chunks.len(),
                    line_start,
                    line_end,
                    text,
                });
            }
            if line_end == lines.len() {
                break;
            }
            line_start += step;
        }

        chunks
    }
}

/// Truncate to at most `max_bytes`, backing up to a char boundary.
fn truncate_to_boundary(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
