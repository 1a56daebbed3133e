//! Incremental indexing over a source tree.
//!
//! The engine walks the source root, hashes each candidate file with blake3,
//! and diffs against the store's inventory: unchanged files are skipped
//! without any embedding work, changed or new files are re-chunked and
//! re-embedded, and inventory entries whose file is gone are deleted. Chunking
//! and embedding costs are paid only for the delta.

use crate::error::IndexError;
use crate::storage::{ChunkRecord, StoreStats, VectorStore};
use codeask_context::{ChunkConfig, TextChunker};
use codeask_embed::EmbeddingProvider;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ignore file honored in addition to `.gitignore`.
const IGNORE_FILENAME: &str = ".askignore";

/// Configuration for the indexing engine.
#[derive(Debug, Clone)]
pub struct IndexEngineConfig {
    /// Root of the source tree to index.
    pub root: PathBuf,
    pub chunk_config: ChunkConfig,
}

impl IndexEngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_config: ChunkConfig::default(),
        }
    }

    pub fn with_chunk_config(mut self, chunk_config: ChunkConfig) -> Self {
        self.chunk_config = chunk_config;
        self
    }
}

/// Outcome of one full reindex pass.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Files chunked and embedded this pass (new or changed).
    pub indexed: usize,
    /// Files whose content hash matched the inventory.
    pub unchanged: usize,
    /// Inventory entries deleted because the file is gone.
    pub removed: usize,
    /// Per-file failures as (path, reason); the pass continues past them.
    pub failures: Vec<(String, String)>,
}

/// Drives chunking, embedding, and storage for a source tree.
pub struct IndexEngine {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
    config: IndexEngineConfig,
}

impl IndexEngine {
    /// Build an engine after verifying the store matches the active embedding
    /// configuration. A store built by a different configuration is refused
    /// until purged; an unfingerprinted (fresh) store adopts the active one.
    pub async fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: IndexEngineConfig,
    ) -> Result<Self, IndexError> {
        let active = provider.fingerprint();
        match store.embedding_fingerprint().await? {
            Some(stored) if stored != active => {
                return Err(IndexError::ConfigurationMismatch { stored, active });
            }
            Some(_) => {}
            None => store.set_embedding_fingerprint(&active).await?,
        }

        let chunker = TextChunker::new(config.chunk_config.clone());
        Ok(Self {
            store,
            provider,
            chunker,
            config,
        })
    }

    /// Walk the source root and bring the store up to date with it.
    pub async fn full_reindex(&self) -> Result<IndexReport, IndexError> {
        let inventory = self.store.file_inventory().await?;
        let mut report = IndexReport::default();
        let mut seen = BTreeSet::new();

        tracing::info!(root = %self.config.root.display(), "starting full reindex");

        for path in self.collect_candidate_files() {
            let relative = match self.relative_path(&path) {
                Some(rel) => rel,
                None => continue,
            };

            // Present on disk, so never subject to deletion propagation,
            // even if reading or embedding it fails below.
            seen.insert(relative.clone());

            let text = match read_text_file(&path).await {
                Ok(Some(text)) => text,
                Ok(None) => continue, // binary or non-UTF-8
                Err(e) => {
                    tracing::warn!(path = %relative, error = %e, "failed to read file");
                    report.failures.push((relative, e.to_string()));
                    continue;
                }
            };
            let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
            if inventory.get(&relative).map(String::as_str) == Some(hash.as_str()) {
                report.unchanged += 1;
                continue;
            }

            match self.index_content(&relative, &text, &hash).await {
                Ok(chunks) => {
                    tracing::debug!(path = %relative, chunks, "indexed file");
                    report.indexed += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %relative, error = %e, "failed to index file");
                    report.failures.push((relative, e.to_string()));
                }
            }
        }

        // Inventory entries whose file disappeared from the tree.
        for path in inventory.keys() {
            if !seen.contains(path) {
                let removed = self.store.delete_file(path).await?;
                tracing::debug!(path = %path, chunks = removed, "removed deleted file");
                report.removed += 1;
            }
        }

        tracing::info!(
            indexed = report.indexed,
            unchanged = report.unchanged,
            removed = report.removed,
            failures = report.failures.len(),
            "full reindex complete"
        );
        Ok(report)
    }

    /// Force one file through the pipeline regardless of its hash.
    /// Returns the number of chunks stored.
    ///
    /// The path must resolve to a file under the source root; absolute
    /// arguments and `..` escapes fail without touching the store.
    pub async fn reindex_file(&self, path: &str) -> Result<usize, IndexError> {
        let requested = self.config.root.join(path);
        let root = self.config.root.canonicalize()?;
        let full_path = requested
            .canonicalize()
            .map_err(|_| IndexError::FileNotFound {
                path: requested.clone(),
            })?;
        // Containment is checked on the resolved path, so `Path::join`
        // swallowing the root on an absolute argument cannot reach files
        // outside the tree. Resolving also gives `./a.rs` and `a.rs` the
        // same chunk ids.
        let relative = match full_path.strip_prefix(&root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => return Err(IndexError::FileNotFound { path: requested }),
        };
        if !full_path.is_file() {
            return Err(IndexError::FileNotFound { path: full_path });
        }

        match read_text_file(&full_path).await? {
            Some(text) => {
                let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
                self.index_content(&relative, &text, &hash).await
            }
            None => {
                // Not embeddable text; drop whatever was stored for it before.
                tracing::warn!(path = %relative, "file is not UTF-8 text, removing stale chunks");
                self.store.delete_file(&relative).await?;
                Ok(0)
            }
        }
    }

    pub async fn status(&self) -> Result<StoreStats, IndexError> {
        self.store.stats().await
    }

    /// Chunk, embed, and store one file's content. Empty content clears the
    /// file's chunks and stores nothing.
    async fn index_content(
        &self,
        relative: &str,
        text: &str,
        content_hash: &str,
    ) -> Result<usize, IndexError> {
        let chunks = self.chunker.chunk(relative, text);
        if chunks.is_empty() {
            self.store.upsert_file_chunks(relative, &[]).await?;
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let result = self.provider.embed_texts(&texts).await?;
        if result.len() != chunks.len() {
            return Err(codeask_embed::EmbedError::unexpected_response(format!(
                "embedded {} of {} chunks",
                result.len(),
                chunks.len()
            ))
            .into());
        }

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(result.embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                chunk_id: chunk.chunk_id(),
                file_path: chunk.path.clone(),
                sequence: chunk.sequence,
                line_start: chunk.line_start,
                line_end: chunk.line_end,
                content: chunk.text.clone(),
                content_hash: content_hash.to_string(),
                embedding,
            })
            .collect();

        self.store.upsert_file_chunks(relative, &records).await?;
        Ok(records.len())
    }

    /// Files under the root, honoring `.gitignore` and `.askignore`.
    fn collect_candidate_files(&self) -> Vec<PathBuf> {
        WalkBuilder::new(&self.config.root)
            .add_custom_ignore_filename(IGNORE_FILENAME)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .collect()
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.config.root)
            .ok()
            .map(|rel| rel.to_string_lossy().into_owned())
    }
}

/// Read a file as text; `None` when the content is binary or non-UTF-8.
async fn read_text_file(path: &Path) -> Result<Option<String>, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}
