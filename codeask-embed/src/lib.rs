//! # codeask-embed
//!
//! Text embedding generation for the codeask indexing pipeline, with two
//! interchangeable providers behind one trait:
//!
//! - **Local**: in-process ONNX models via fastembed. Built-in model names work
//!   out of the box; user-defined ONNX models load from a configured directory
//!   behind an explicit `trust_remote_code` opt-in.
//! - **Remote**: an OpenAI-compatible `/embeddings` endpoint (LM Studio,
//!   llama.cpp server).
//!
//! Both providers return L2-normalized half-precision (`f16`) vectors, so the
//! store can rank by plain dot product. Each provider exposes a fingerprint
//! string identifying its configuration; the index layer records it and refuses
//! to mix vectors from different configurations.
//!
//! ```no_run
//! use codeask_embed::{EmbedConfig, LocalEmbedConfig, create_provider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbedConfig::Local(LocalEmbedConfig::new("all-minilm-l6-v2"));
//! let provider = create_provider(&config).await?;
//!
//! let texts = vec!["fn main() {}".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("{} vectors of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod remote;

pub use config::{EmbedConfig, LocalEmbedConfig, RemoteEmbedConfig};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, LocalProvider};
pub use remote::RemoteProvider;

use std::sync::Arc;

/// Build the provider selected by the configuration.
///
/// The local variant loads its model eagerly so misconfiguration surfaces at
/// startup; the remote variant defers to the first request.
pub async fn create_provider(config: &EmbedConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config {
        EmbedConfig::Local(local) => Ok(Arc::new(LocalProvider::create(local.clone()).await?)),
        EmbedConfig::Remote(remote) => Ok(Arc::new(RemoteProvider::new(remote.clone()))),
    }
}
