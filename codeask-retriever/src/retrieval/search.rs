//! Question-to-chunks retrieval path.

use crate::error::IndexError;
use crate::storage::{ScoredChunk, VectorStore};
use codeask_embed::EmbeddingProvider;
use std::sync::Arc;

/// Embeds a question and pulls the closest chunks from the store.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            provider,
            top_k,
        }
    }

    /// Top-k chunks by ascending cosine distance to the question.
    /// An empty store yields an empty result, not an error.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, IndexError> {
        let query = self.provider.embed_text(question).await?;
        let results = self.store.query(&query, self.top_k).await?;
        tracing::debug!(
            question_len = question.len(),
            results = results.len(),
            "retrieved context chunks"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChunkRecord, SqliteStore};
    use crate::testing::HashProvider;
    use anyhow::Result;

    async fn store_with_texts(
        provider: &HashProvider,
        texts: &[(&str, &str)],
    ) -> Result<Arc<SqliteStore>> {
        let store = Arc::new(SqliteStore::open_memory().await?);
        for (path, text) in texts {
            let embedding = provider.embed_text(text).await?;
            store
                .upsert_file_chunks(
                    path,
                    &[ChunkRecord {
                        chunk_id: format!("{path}:0"),
                        file_path: path.to_string(),
                        sequence: 0,
                        line_start: 0,
                        line_end: 1,
                        content: text.to_string(),
                        content_hash: "hash".to_string(),
                        embedding,
                    }],
                )
                .await?;
        }
        Ok(store)
    }

    #[tokio::test]
    async fn test_exact_match_ranks_first() -> Result<()> {
        let provider = Arc::new(HashProvider::new(16));
        let store = store_with_texts(
            &provider,
            &[("a.rs", "alpha text"), ("b.rs", "beta text"), ("c.rs", "gamma text")],
        )
        .await?;

        let retriever = Retriever::new(store, provider, 2);
        let results = retriever.retrieve("beta text").await?;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_path, "b.rs");
        assert!(results[0].distance < 1e-3);
        assert!(results[0].distance <= results[1].distance);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_chunks() -> Result<()> {
        let provider = Arc::new(HashProvider::new(16));
        let store = Arc::new(SqliteStore::open_memory().await?);

        let retriever = Retriever::new(store, provider, 5);
        assert!(retriever.retrieve("anything").await?.is_empty());
        Ok(())
    }
}
