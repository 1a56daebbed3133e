//! Application configuration loaded from `codeask.toml`.
//!
//! A missing file is not an error: every section and field has a default
//! tuned for a local LM Studio style setup. A present but malformed file is
//! fatal at startup.

use anyhow::Context;
use codeask_context::ChunkConfig;
use codeask_embed::{EmbedConfig, LocalEmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_PROMPT_TEMPLATE: &str = "Use the following context from the codebase to answer the question.\n\nContext:\n{context}\n\nQuestion: {question}";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant answering questions about a codebase.";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub chunking: ChunkingSection,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values that would misbehave downstream before anything runs.
    fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.max_chunk_lines == 0 {
            anyhow::bail!("chunking.max_chunk_lines must be at least 1");
        }
        if self.chunking.overlap_lines >= self.chunking.max_chunk_lines {
            anyhow::bail!(
                "chunking.overlap_lines ({}) must be smaller than chunking.max_chunk_lines ({})",
                self.chunking.overlap_lines,
                self.chunking.max_chunk_lines
            );
        }
        Ok(())
    }
}

/// Chat-completion endpoint settings and prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request streamed fragments rather than one JSON body.
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Template with `{context}` and `{question}` placeholders.
    #[serde(default = "default_prompt_template")]
    pub master_prompt_template: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: default_stream(),
            system_prompt: default_system_prompt(),
            master_prompt_template: default_prompt_template(),
        }
    }
}

/// Embedding provider selection plus retrieval depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSection {
    #[serde(flatten)]
    pub provider: EmbedConfig,
    #[serde(default = "default_top_k")]
    pub top_k_chunks: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: EmbedConfig::Local(LocalEmbedConfig::new("all-minilm-l6-v2")),
            top_k_chunks: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// History cap counted in exchanges (user+assistant pairs).
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSection {
    #[serde(default = "default_max_chunk_lines")]
    pub max_chunk_lines: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            max_chunk_lines: default_max_chunk_lines(),
            overlap_lines: default_overlap_lines(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

impl From<ChunkingSection> for ChunkConfig {
    fn from(section: ChunkingSection) -> Self {
        ChunkConfig {
            max_chunk_lines: section.max_chunk_lines,
            overlap_lines: section.overlap_lines,
            max_chunk_bytes: section.max_chunk_bytes,
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_llm_model() -> String {
    "local-model".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_stream() -> bool {
    true
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_max_history_length() -> usize {
    10
}

fn default_max_chunk_lines() -> usize {
    ChunkConfig::default().max_chunk_lines
}

fn default_overlap_lines() -> usize {
    ChunkConfig::default().overlap_lines
}

fn default_max_chunk_bytes() -> usize {
    ChunkConfig::default().max_chunk_bytes
}
