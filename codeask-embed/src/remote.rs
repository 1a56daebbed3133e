//! Remote embedding provider speaking the OpenAI-compatible `/embeddings` API

use crate::config::RemoteEmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{normalize_to_f16, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use half::f16;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint
/// (LM Studio, llama.cpp server, and the like).
///
/// The server declares no dimension of its own, so the configured `dimension`
/// is authoritative: every returned vector is validated against it.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    config: RemoteEmbedConfig,
    client: reqwest::Client,
}

impl RemoteProvider {
    pub fn new(config: RemoteEmbedConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.config.endpoint();
        let body = EmbeddingsRequest {
            model: &self.config.model_name,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| EmbedError::Unavailable {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbedError::unexpected_response(format!(
                "{url} returned {status}: {detail}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::unexpected_response(format!("invalid JSON body: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::unexpected_response(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.config.dimension {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: item.embedding.len(),
                });
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::unexpected_response("server returned no embedding"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!(count = texts.len(), url = %self.config.endpoint(), "requesting embeddings");

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let raw = self.request_batch(batch).await?;
            all_embeddings.extend(normalize_to_f16(raw));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn fingerprint(&self) -> String {
        format!(
            "remote:{}:{}:cosine",
            self.config.model_name, self.config.dimension
        )
    }
}
