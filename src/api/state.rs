use std::sync::Arc;

use crate::fetch::BlobFetcher;
use crate::ingest::IngestionCoordinator;
use crate::store::LibraryStore;

/// Shared state for all handlers. Built once in `main`; no global mutable
/// configuration after startup.
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub coordinator: IngestionCoordinator,
    pub default_embedding_model: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        fetcher: BlobFetcher,
        default_embedding_model: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator: IngestionCoordinator::new(store.clone(), fetcher),
            store,
            default_embedding_model: default_embedding_model.into(),
        })
    }
}
