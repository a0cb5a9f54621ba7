mod dto;
mod error;
mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Build the application router. Static segments (`/libraries/files`,
/// `/libraries/embed`) take priority over the `{name}` capture.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/libraries",
            post(handlers::create_library).get(handlers::list_libraries),
        )
        .route(
            "/libraries/{name}",
            get(handlers::get_library).delete(handlers::delete_library),
        )
        .route("/libraries/files", post(handlers::add_file))
        .route("/libraries/embed", post(handlers::create_embeddings))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
