//! Configuration for embedding providers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_batch_size() -> usize {
    16
}

/// Which embedding variant to run, resolved once at startup.
///
/// The two variants must never be mixed within one store: the provider built
/// from this config exposes a fingerprint that the index manager records and
/// verifies on every startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum EmbedConfig {
    Local(LocalEmbedConfig),
    Remote(RemoteEmbedConfig),
}

impl EmbedConfig {
    /// Name of the configured model, independent of variant.
    pub fn model_name(&self) -> &str {
        match self {
            EmbedConfig::Local(c) => &c.model_name,
            EmbedConfig::Remote(c) => &c.model_name,
        }
    }
}

/// Settings for the in-process fastembed variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEmbedConfig {
    /// Built-in model name, or the directory name of a user-defined model
    /// under `model_dir`.
    #[serde(rename = "model")]
    pub model_name: String,
    /// Base directory holding user-defined model directories.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Opt-in for user-defined models, which may ship custom code.
    #[serde(default)]
    pub trust_remote_code: bool,
    /// Maximum texts per in-process embedding batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl LocalEmbedConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_dir: default_model_dir(),
            trust_remote_code: false,
            batch_size: default_batch_size(),
        }
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_trust_remote_code(mut self, trust: bool) -> Self {
        self.trust_remote_code = trust;
        self
    }

    /// Directory containing a user-defined model's files.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_name)
    }

    /// Path to a user-defined model's ONNX file.
    pub fn onnx_model_path(&self) -> PathBuf {
        let model_dir = self.model_path();
        let quantized = model_dir.join("onnx").join("model_quantized.onnx");
        if quantized.exists() {
            return quantized;
        }
        model_dir.join("onnx").join("model.onnx")
    }
}

/// Settings for the remote `/embeddings` endpoint variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEmbedConfig {
    /// Base URL of the server, e.g. `http://localhost:1234/v1`.
    pub server_url: String,
    /// Model name passed through in each request.
    #[serde(rename = "model")]
    pub model_name: String,
    /// Declared vector dimension; every response is validated against it.
    pub dimension: usize,
    /// Texts per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl RemoteEmbedConfig {
    /// Full URL of the embeddings endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/embeddings", self.server_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_paths() {
        let config = LocalEmbedConfig::new("my-model").with_model_dir("/opt/models");
        assert_eq!(config.model_path(), PathBuf::from("/opt/models/my-model"));
        assert!(!config.trust_remote_code);
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn test_remote_endpoint_strips_trailing_slash() {
        let config = RemoteEmbedConfig {
            server_url: "http://localhost:1234/v1/".to_string(),
            model_name: "local-model".to_string(),
            dimension: 768,
            batch_size: 16,
        };
        assert_eq!(config.endpoint(), "http://localhost:1234/v1/embeddings");
    }

    #[test]
    fn test_mode_tag_selects_the_variant() {
        let local: EmbedConfig = serde_json::from_value(serde_json::json!({
            "mode": "local",
            "model": "all-minilm-l6-v2",
        }))
        .unwrap();
        assert_eq!(local.model_name(), "all-minilm-l6-v2");
        assert!(matches!(local, EmbedConfig::Local(_)));

        let remote: EmbedConfig = serde_json::from_value(serde_json::json!({
            "mode": "remote",
            "model": "local-model",
            "server_url": "http://localhost:1234/v1",
            "dimension": 768,
        }))
        .unwrap();
        match remote {
            EmbedConfig::Remote(c) => {
                assert_eq!(c.dimension, 768);
                assert_eq!(c.batch_size, 16);
            }
            EmbedConfig::Local(_) => panic!("expected remote variant"),
        }
    }
}
