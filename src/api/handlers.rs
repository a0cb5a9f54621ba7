use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::dto::*;
use super::error::ApiError;
use super::state::AppState;
use crate::ingest::IngestionRequest;

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "librag",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /libraries - create (or reopen) a library
pub async fn create_library(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLibraryRequest>,
) -> Result<(StatusCode, Json<LibraryResponse>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "Library name must not be empty".to_string(),
        ));
    }

    let card = state.store.load_or_create(name).await.map_err(|err| {
        tracing::error!(library = name, error = %err, "failed to create library");
        ApiError::from(err)
    })?;
    let status = state.store.embedding_status(name).await.map_err(|err| {
        tracing::error!(library = name, error = %err, "failed to read embedding status");
        ApiError::from(err)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(LibraryResponse::from_card(card, status)),
    ))
}

/// GET /libraries
pub async fn list_libraries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryListResponse>, ApiError> {
    let libraries = state.store.list_libraries().await.map_err(|err| {
        tracing::error!(error = %err, "failed to list libraries");
        ApiError::from(err)
    })?;

    Ok(Json(LibraryListResponse { libraries }))
}

/// GET /libraries/{name}
pub async fn get_library(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let card = state.store.library_card(&name).await.map_err(ApiError::from)?;
    let status = state
        .store
        .embedding_status(&name)
        .await
        .map_err(|err| {
            tracing::error!(library = %name, error = %err, "failed to read embedding status");
            ApiError::from(err)
        })?;

    Ok(Json(LibraryResponse::from_card(card, status)))
}

/// DELETE /libraries/{name}
pub async fn delete_library(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteLibraryResponse>, ApiError> {
    state.store.delete_library(&name).await.map_err(|err| {
        tracing::error!(library = %name, error = %err, "failed to delete library");
        ApiError::from(err)
    })?;

    Ok(Json(DeleteLibraryResponse {
        message: format!("Library '{name}' deleted successfully"),
        library_name: name,
    }))
}

/// POST /libraries/files - fetch a blob and ingest it into a library
pub async fn add_file(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddFileRequest>,
) -> Result<Json<AddFileResponse>, ApiError> {
    let report = state
        .coordinator
        .ingest(IngestionRequest {
            filename: req.filename,
            library_name: req.library_name,
            blob_uri: req.blob_uri,
        })
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "ingestion failed");
            ApiError::from(err)
        })?;

    Ok(Json(AddFileResponse {
        filename: report.filename,
        library_name: report.library_name,
        parsing_output: report.parsing_output,
        message: report.message,
    }))
}

/// POST /libraries/embed - install embeddings for a library
pub async fn create_embeddings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let model = req
        .embedding_model
        .unwrap_or_else(|| state.default_embedding_model.clone());

    let status = state
        .coordinator
        .install_embeddings(&req.library_name, &model)
        .await
        .map_err(|err| {
            tracing::error!(
                library = %req.library_name,
                model = %model,
                error = %err,
                "embedding installation failed"
            );
            ApiError::from(err)
        })?;

    Ok(Json(EmbeddingResponse {
        library_name: req.library_name,
        embedding_model: model,
        embedding_status: status,
        message: "Embeddings created successfully".to_string(),
    }))
}
