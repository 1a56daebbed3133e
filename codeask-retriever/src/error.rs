//! Error types for indexing and session management

use std::path::PathBuf;

/// Errors from the indexing pipeline and vector store.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The store was built by a different embedding configuration than the one
    /// now active. Fatal until the store is purged; vectors from different
    /// configurations are never mixed.
    #[error(
        "index was built with embedding configuration '{stored}' but '{active}' is active; run !purge to rebuild the index"
    )]
    ConfigurationMismatch { stored: String, active: String },

    /// A file named for reindexing does not exist under the source root.
    #[error("file not found under source root: {path}")]
    FileNotFound { path: PathBuf },

    /// Embedding generation failed.
    #[error(transparent)]
    Embed(#[from] codeask_embed::EmbedError),

    /// Database errors from the vector store.
    #[error("store error: {source}")]
    Store {
        #[from]
        source: sqlx::Error,
    },

    /// IO errors while reading source files
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Errors from named conversation sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Named session does not exist.
    #[error("no session named '{name}'")]
    NotFound { name: String },

    /// A session with this name already exists.
    #[error("session '{name}' already exists")]
    AlreadyExists { name: String },

    /// The active session cannot be deleted.
    #[error("session '{name}' is active; switch away before deleting it")]
    ActiveSession { name: String },

    /// Database errors from session storage.
    #[error("store error: {source}")]
    Store {
        #[from]
        source: sqlx::Error,
    },

    /// Session overrides failed to serialize or parse.
    #[error("invalid session overrides: {source}")]
    Overrides {
        #[from]
        source: serde_json::Error,
    },
}
