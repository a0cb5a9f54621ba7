use serde::{Deserialize, Serialize};

use crate::store::{EmbeddingStatus, LibraryCard, ParsingOutput};

/// POST /libraries request
#[derive(Debug, Deserialize)]
pub struct CreateLibraryRequest {
    pub name: String,
}

/// Library details (POST /libraries, GET /libraries/{name})
#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub name: String,
    pub embedding_status: Vec<EmbeddingStatus>,
    pub file_count: Option<u64>,
    pub created_at: Option<String>,
}

impl LibraryResponse {
    pub fn from_card(card: LibraryCard, embedding_status: Vec<EmbeddingStatus>) -> Self {
        Self {
            name: card.library_name,
            embedding_status,
            file_count: Some(card.file_count),
            created_at: Some(card.created_at),
        }
    }
}

/// GET /libraries response
#[derive(Debug, Serialize)]
pub struct LibraryListResponse {
    pub libraries: Vec<String>,
}

/// DELETE /libraries/{name} response
#[derive(Debug, Serialize)]
pub struct DeleteLibraryResponse {
    pub library_name: String,
    pub message: String,
}

/// POST /libraries/files request
#[derive(Debug, Deserialize)]
pub struct AddFileRequest {
    pub filename: String,
    pub library_name: String,
    pub blob_uri: String,
}

/// POST /libraries/files response
#[derive(Debug, Serialize)]
pub struct AddFileResponse {
    pub filename: String,
    pub library_name: String,
    pub parsing_output: ParsingOutput,
    pub message: String,
}

/// POST /libraries/embed request. A missing model falls back to the
/// service's configured default.
#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    pub library_name: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
}

/// POST /libraries/embed response
#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub library_name: String,
    pub embedding_model: String,
    pub embedding_status: Vec<EmbeddingStatus>,
    pub message: String,
}

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
