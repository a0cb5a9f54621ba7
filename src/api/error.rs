use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::ingest::IngestError;
use crate::store::StoreError;

/// API-layer error type. Messages are generic on purpose: the detailed
/// cause is logged server-side, never echoed to untrusted callers.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - Bad request (invalid input, unreachable blob)
    BadRequest(String),

    /// 404 - Unknown library
    NotFound(String),

    /// 500 - Internal error
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };

        (status, Json(ErrorBody { detail })).into_response()
    }
}

// Classify pipeline failures by stage: transport problems are the caller's
// to fix, everything after a successful fetch is ours.
impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            IngestError::Fetch(fetch_err) if fetch_err.is_caller_fault() => {
                ApiError::BadRequest("Failed to download file from blob storage".to_string())
            }
            IngestError::Fetch(_) => {
                ApiError::Internal("Failed to stage downloaded file".to_string())
            }
            IngestError::Library(store_err) => match store_err {
                StoreError::InvalidLibraryName(_) => {
                    ApiError::BadRequest("Invalid library name".to_string())
                }
                _ => ApiError::Internal("Failed to resolve library".to_string()),
            },
            IngestError::Parse(_) => {
                ApiError::Internal("Failed to add file to library".to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LibraryNotFound(name) => {
                ApiError::NotFound(format!("Library '{name}' not found"))
            }
            StoreError::InvalidLibraryName(_) => {
                ApiError::BadRequest("Invalid library name".to_string())
            }
            StoreError::UnknownModel(name) => {
                ApiError::BadRequest(format!("Unknown embedding model '{name}'"))
            }
            StoreError::DimensionMismatch { .. } => ApiError::BadRequest(
                "Embedding model dimension does not match this store".to_string(),
            ),
            _ => ApiError::Internal("Internal storage error".to_string()),
        }
    }
}
