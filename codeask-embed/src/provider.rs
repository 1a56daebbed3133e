//! Embedding provider trait and the in-process fastembed implementation

use crate::config::LocalEmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use half::f16;
use std::sync::{Arc, Mutex};
use tokio::fs;

/// Result of embedding generation, one vector per input text.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f16>>,
    /// Dimension of each vector, inferred from the first one (0 when empty).
    pub dimension: usize,
}

impl EmbeddingResult {
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations return unit-length `f16` vectors, so cosine similarity
/// downstream reduces to a dot product.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing).
    /// An empty slice returns an empty result without touching the model.
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Dimension of vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Stable identity string for the provider configuration: variant, model,
    /// dimension, and distance metric. Recorded in store metadata and compared
    /// on startup so vectors from different configurations never mix.
    fn fingerprint(&self) -> String;
}

/// Convert f32 embeddings to unit-length f16 vectors.
pub(crate) fn normalize_to_f16(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
    embeddings
        .into_iter()
        .map(|embedding| {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                embedding
                    .into_iter()
                    .map(|x| f16::from_f32(x / norm))
                    .collect()
            } else {
                embedding.into_iter().map(f16::from_f32).collect()
            }
        })
        .collect()
}

/// Map a configured model name onto a built-in fastembed model.
fn builtin_model(name: &str) -> Option<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        _ => None,
    }
}

/// In-process embedding provider backed by fastembed ONNX models.
///
/// Known model names resolve to built-in fastembed models; any other name is
/// treated as a user-defined model directory under the configured `model_dir`,
/// which requires `trust_remote_code = true`.
#[derive(Clone)]
pub struct LocalProvider {
    config: LocalEmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalProvider {
    /// Load the configured model and probe its dimension.
    pub async fn create(config: LocalEmbedConfig) -> Result<Self> {
        tracing::info!(model = %config.model_name, "initializing local embedding provider");

        let (model, dimension) = if let Some(builtin) = builtin_model(&config.model_name) {
            Self::load_builtin(builtin).await?
        } else {
            if !config.trust_remote_code {
                return Err(EmbedError::TrustRequired {
                    model: config.model_name.clone(),
                });
            }
            Self::load_user_defined(&config).await?
        };

        tracing::info!(model = %config.model_name, dimension, "embedding model loaded");
        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    async fn load_builtin(builtin: EmbeddingModel) -> Result<(TextEmbedding, usize)> {
        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            let mut model = TextEmbedding::try_new(InitOptions::new(builtin))
                .map_err(|e| EmbedError::External { source: e })?;
            let dimension = probe_dimension(&mut model)?;
            Ok((model, dimension))
        })
        .await?
    }

    /// Load a user-defined ONNX model and tokenizer from `model_dir/<model>/`.
    async fn load_user_defined(config: &LocalEmbedConfig) -> Result<(TextEmbedding, usize)> {
        let model_dir = config.model_path();
        let onnx_path = config.onnx_model_path();
        if !onnx_path.exists() {
            return Err(EmbedError::ModelFileNotFound { path: onnx_path });
        }

        let onnx_file = fs::read(&onnx_path).await?;
        let tokenizer_file = read_model_file(model_dir.join("tokenizer.json")).await?;
        let config_file = read_model_file(model_dir.join("config.json")).await?;
        let special_tokens_map_file =
            read_model_file(model_dir.join("special_tokens_map.json")).await?;
        let tokenizer_config_file =
            read_model_file(model_dir.join("tokenizer_config.json")).await?;

        let tokenizer_files = TokenizerFiles {
            tokenizer_file,
            config_file,
            special_tokens_map_file,
            tokenizer_config_file,
        };
        let user_model = UserDefinedEmbeddingModel::new(onnx_file, tokenizer_files);

        tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
            let mut model = TextEmbedding::try_new_from_user_defined(user_model, Default::default())
                .map_err(|e| EmbedError::External { source: e })?;
            let dimension = probe_dimension(&mut model)?;
            Ok((model, dimension))
        })
        .await?
    }
}

/// Read one model file, mapping absence to the remediation error.
async fn read_model_file(path: std::path::PathBuf) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(EmbedError::ModelFileNotFound { path });
    }
    Ok(fs::read(&path).await?)
}

/// Determine the output dimension by embedding a probe text.
fn probe_dimension(model: &mut TextEmbedding) -> Result<usize> {
    let probe = model
        .embed(vec!["dimension probe".to_string()], None)
        .map_err(|e| EmbedError::External { source: e })?;
    probe
        .first()
        .map(|emb| emb.len())
        .filter(|len| *len > 0)
        .ok_or_else(|| EmbedError::invalid_config("model produced no embedding for probe text"))
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("no embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!(count = texts.len(), "generating embeddings");

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().unwrap();
                guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            all_embeddings.extend(normalize_to_f16(raw));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        format!("local:{}:{}:cosine", self.config.model_name, self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_embedding_result_infers_dimension() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::new(vec![]);
        assert_eq!(empty.dimension, 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_normalize_produces_unit_vectors() {
        let normalized = normalize_to_f16(vec![vec![3.0, 4.0]]);
        let norm: f32 = normalized[0]
            .iter()
            .map(|x| x.to_f32() * x.to_f32())
            .sum::<f32>()
            .sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        // Zero vector stays zero rather than dividing by zero.
        let zero = normalize_to_f16(vec![vec![0.0, 0.0]]);
        assert!(zero[0].iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn test_builtin_model_names() {
        assert!(builtin_model("all-minilm-l6-v2").is_some());
        assert!(builtin_model("bge-small-en-v1.5").is_some());
        assert!(builtin_model("my-finetuned-model").is_none());
    }

    #[tokio::test]
    async fn test_user_defined_model_requires_trust() {
        let config = LocalEmbedConfig::new("my-finetuned-model");
        let err = LocalProvider::create(config).await.unwrap_err();
        assert!(matches!(err, EmbedError::TrustRequired { model } if model == "my-finetuned-model"));
    }

    #[tokio::test]
    async fn test_missing_model_files_are_reported_with_path() {
        let temp = tempdir().unwrap();
        let config = LocalEmbedConfig::new("my-finetuned-model")
            .with_model_dir(temp.path())
            .with_trust_remote_code(true);

        let err = LocalProvider::create(config).await.unwrap_err();
        match err {
            EmbedError::ModelFileNotFound { path } => {
                assert!(path.to_string_lossy().contains("my-finetuned-model"));
            }
            other => panic!("expected ModelFileNotFound, got {other:?}"),
        }
    }
}
