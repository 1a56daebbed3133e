//! Deterministic embedding providers for tests. No model, no network.

use async_trait::async_trait;
use codeask_embed::{EmbedError, EmbeddingProvider, EmbeddingResult};
use half::f16;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provider that derives a deterministic unit vector from the text's blake3
/// hash and counts how many embedding batches it served. The counter is what
/// lets tests assert that unchanged files cost zero embedding calls.
pub struct HashProvider {
    dimension: usize,
    fingerprint: String,
    batches: AtomicUsize,
    /// Texts containing this marker fail to embed, for partial-failure tests.
    poison: Option<String>,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fingerprint: format!("mock:hash:{dimension}:cosine"),
            batches: AtomicUsize::new(0),
            poison: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub fn with_poison(mut self, marker: impl Into<String>) -> Self {
        self.poison = Some(marker.into());
        self
    }

    /// Number of non-empty `embed_texts` batches served so far.
    pub fn batches_served(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn embed_one(&self, text: &str) -> Vec<f16> {
        let hash = blake3::hash(text.as_bytes());
        let bytes = hash.as_bytes();
        let raw: Vec<f32> = (0..self.dimension)
            .map(|i| bytes[i % bytes.len()] as f32 - 127.5)
            .collect();
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        raw.into_iter().map(|x| f16::from_f32(x / norm)).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    async fn embed_text(&self, text: &str) -> codeask_embed::Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        Ok(result.embeddings.into_iter().next().unwrap())
    }

    async fn embed_texts(&self, texts: &[String]) -> codeask_embed::Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        if let Some(marker) = &self.poison {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(EmbedError::unexpected_response("poisoned text"));
            }
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_one(t)).collect(),
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}
