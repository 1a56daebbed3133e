//! Error types for the embedding system

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type covering both embedding variants.
///
/// The variants map onto distinct failure classes: missing local runtime
/// prerequisites ([`ModelFileNotFound`](EmbedError::ModelFileNotFound),
/// [`TrustRequired`](EmbedError::TrustRequired)), an unreachable remote
/// collaborator ([`Unavailable`](EmbedError::Unavailable)), and configuration
/// problems that are fatal until fixed
/// ([`DimensionMismatch`](EmbedError::DimensionMismatch),
/// [`InvalidConfig`](EmbedError::InvalidConfig)). Callers that keep going on
/// per-file failures (the index manager) rely on every variant being
/// reportable without tearing anything down.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A required local model file is absent.
    #[error(
        "model file not found: {path}. Place the model's ONNX and tokenizer files under that directory, or switch to a built-in model name"
    )]
    ModelFileNotFound { path: PathBuf },

    /// A user-defined model was requested without opting in to running its code.
    #[error(
        "model '{model}' is not a built-in model and may ship custom code; set trust_remote_code = true in the embedding configuration to load it"
    )]
    TrustRequired { model: String },

    /// The embedding configuration is invalid.
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// A returned vector does not match the declared dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The remote embedding endpoint could not be reached.
    #[error("embedding endpoint unreachable at {url}: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote endpoint answered with something we cannot use.
    #[error("unexpected response from embedding endpoint: {detail}")]
    UnexpectedResponse { detail: String },

    /// IO errors when reading model files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("external error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an unexpected-response error with a custom detail string.
    pub fn unexpected_response<S: Into<String>>(detail: S) -> Self {
        Self::UnexpectedResponse {
            detail: detail.into(),
        }
    }
}
