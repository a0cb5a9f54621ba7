//! Library store seam. The [`LibraryStore`] trait is the boundary between
//! the HTTP/ingestion layer and the RAG backend; [`lance::LanceLibraryStore`]
//! is the concrete LanceDB-backed implementation.

pub mod embedder;
pub mod lance;
pub mod parser;

pub use embedder::Embedder;
pub use lance::LanceLibraryStore;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque parsing summary, passed through to the caller field-for-field.
pub type ParsingOutput = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("library '{0}' not found")]
    LibraryNotFound(String),

    #[error("invalid library name '{0}'")]
    InvalidLibraryName(String),

    #[error("unknown embedding model '{0}'")]
    UnknownModel(String),

    #[error("embedding model dimension {model_dim} does not match store dimension {store_dim}")]
    DimensionMismatch { model_dim: usize, store_dim: usize },

    #[error("database error: {0}")]
    Database(#[from] lancedb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("embedding error: {0}")]
    Embed(#[from] embedder::EmbedError),

    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Metadata row for one library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryCard {
    pub library_name: String,
    pub created_at: String,
    pub file_count: u64,
}

/// One embedding installation record for a library. Field defaults mirror
/// the "no embeddings yet" presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingStatus {
    pub embedding_status: String,
    pub embedded_blocks: u64,
    pub embedding_model: String,
    pub embedding_db: String,
    pub time_stamp: String,
}

impl Default for EmbeddingStatus {
    fn default() -> Self {
        Self {
            embedding_status: "no embeddings".to_string(),
            embedded_blocks: 0,
            embedding_model: "NA".to_string(),
            embedding_db: "NA".to_string(),
            time_stamp: "NA".to_string(),
        }
    }
}

/// The external-store contract consumed by the coordinator and the API
/// handlers. Object-safe so tests can substitute a mock.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Load a library by name, creating it if absent. Existing names are
    /// success, never an error.
    async fn load_or_create(&self, name: &str) -> Result<LibraryCard, StoreError>;

    /// Load an existing library's card; missing → `LibraryNotFound`.
    async fn library_card(&self, name: &str) -> Result<LibraryCard, StoreError>;

    async fn list_libraries(&self) -> Result<Vec<String>, StoreError>;

    async fn delete_library(&self, name: &str) -> Result<(), StoreError>;

    /// Parse a staged local file and persist its chunks against the named
    /// library. Returns the backend's structured summary; `None` means the
    /// backend produced no output (the caller substitutes an empty map).
    async fn add_file(
        &self,
        library: &str,
        local_path: &Path,
    ) -> Result<Option<ParsingOutput>, StoreError>;

    /// Embed all not-yet-embedded chunks of a library with the named model
    /// and record a status row. Returns the library's status history.
    async fn install_embeddings(
        &self,
        library: &str,
        model_name: &str,
    ) -> Result<Vec<EmbeddingStatus>, StoreError>;

    async fn embedding_status(&self, library: &str) -> Result<Vec<EmbeddingStatus>, StoreError>;
}

/// Library names double as table-name fragments and delete-predicate values,
/// so the accepted alphabet is deliberately narrow.
pub fn validate_library_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidLibraryName(name.to_string()))
    }
}
