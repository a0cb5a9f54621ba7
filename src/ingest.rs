//! Ingestion coordinator: locate-or-create library → fetch blob → delegate
//! parse → guaranteed staged-file cleanup → shaped result. Failures are
//! tagged with the stage they occurred in so the API layer can classify
//! transport problems as caller-input errors and everything else as
//! internal faults.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use crate::fetch::{BlobFetcher, FetchError};
use crate::store::{EmbeddingStatus, LibraryStore, ParsingOutput, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid ingestion request: {0}")]
    InvalidRequest(String),

    #[error("library resolution failed: {0}")]
    Library(#[source] StoreError),

    #[error("blob fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[source] StoreError),
}

/// Immutable per-request input.
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub filename: String,
    pub library_name: String,
    pub blob_uri: String,
}

/// Shaped pipeline result. `parsing_output` is the backend's summary passed
/// through field-for-field, with an empty map substituted when the backend
/// produced nothing.
#[derive(Debug)]
pub struct IngestionReport {
    pub filename: String,
    pub library_name: String,
    pub parsing_output: ParsingOutput,
    pub message: String,
}

/// Orchestrates single-request ingestion. Holds no cross-request state
/// except the per-library-name write locks.
pub struct IngestionCoordinator {
    store: Arc<dyn LibraryStore>,
    fetcher: BlobFetcher,
    // Concurrent writers to the same library are serialized; the backend's
    // own guarantees under concurrent same-library writes are unspecified.
    library_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn LibraryStore>, fetcher: BlobFetcher) -> Self {
        Self {
            store,
            fetcher,
            library_locks: Mutex::new(HashMap::new()),
        }
    }

    fn library_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.library_locks.lock().expect("library lock map poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run the full ingestion pipeline for one request. The staged file is
    /// removed on every exit path, including cancellation, because it is
    /// owned by this call's stack.
    pub async fn ingest(&self, request: IngestionRequest) -> Result<IngestionReport, IngestError> {
        if request.filename.trim().is_empty() {
            return Err(IngestError::InvalidRequest(
                "filename must not be empty".to_string(),
            ));
        }
        if request.library_name.trim().is_empty() {
            return Err(IngestError::InvalidRequest(
                "library_name must not be empty".to_string(),
            ));
        }

        let lock = self.library_lock(&request.library_name);
        let _guard = lock.lock().await;

        // Stage 1: resolve library. Existing names are success.
        let card = self
            .store
            .load_or_create(&request.library_name)
            .await
            .map_err(IngestError::Library)?;

        info!(
            library = %card.library_name,
            uri = %request.blob_uri,
            filename = %request.filename,
            "ingesting file"
        );

        // Stage 2: stage the blob locally.
        let staged = self
            .fetcher
            .fetch(&request.blob_uri, &request.filename)
            .await
            .map_err(IngestError::Fetch)?;

        // Stage 3: delegate parsing to the store. Failure here is an
        // internal fault: the caller's input already proved fetchable.
        let output = self
            .store
            .add_file(&card.library_name, staged.path())
            .await
            .map_err(IngestError::Parse)?;

        // Stage 4: cleanup. Explicit for the success path; the error paths
        // above drop `staged` the same way.
        drop(staged);

        // Stage 5: shape the result.
        Ok(IngestionReport {
            filename: request.filename,
            library_name: request.library_name,
            parsing_output: output.unwrap_or_default(),
            message: "File added successfully to library".to_string(),
        })
    }

    /// Install embeddings under the same per-library lock, so embedding runs
    /// and ingestion into one library never interleave.
    pub async fn install_embeddings(
        &self,
        library: &str,
        model_name: &str,
    ) -> Result<Vec<EmbeddingStatus>, StoreError> {
        let lock = self.library_lock(library);
        let _guard = lock.lock().await;

        self.store.install_embeddings(library, model_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibraryCard, validate_library_name};
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory store double. Records how often libraries are created and
    /// whether the staged file still existed when parsing ran.
    #[derive(Default)]
    struct MockStore {
        libraries: Mutex<HashSet<String>>,
        creates: AtomicUsize,
        parses: AtomicUsize,
        fail_parse: bool,
        parse_output: Option<ParsingOutput>,
        staged_file_seen: AtomicBool,
    }

    impl MockStore {
        fn with_parse_output(output: ParsingOutput) -> Self {
            Self {
                parse_output: Some(output),
                ..Self::default()
            }
        }

        fn failing_parse() -> Self {
            Self {
                fail_parse: true,
                ..Self::default()
            }
        }

        fn card(name: &str) -> LibraryCard {
            LibraryCard {
                library_name: name.to_string(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                file_count: 0,
            }
        }
    }

    #[async_trait]
    impl LibraryStore for MockStore {
        async fn load_or_create(&self, name: &str) -> Result<LibraryCard, StoreError> {
            validate_library_name(name)?;
            let mut libraries = self.libraries.lock().unwrap();
            if libraries.insert(name.to_string()) {
                self.creates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Self::card(name))
        }

        async fn library_card(&self, name: &str) -> Result<LibraryCard, StoreError> {
            if self.libraries.lock().unwrap().contains(name) {
                Ok(Self::card(name))
            } else {
                Err(StoreError::LibraryNotFound(name.to_string()))
            }
        }

        async fn list_libraries(&self) -> Result<Vec<String>, StoreError> {
            let mut names: Vec<String> =
                self.libraries.lock().unwrap().iter().cloned().collect();
            names.sort();
            Ok(names)
        }

        async fn delete_library(&self, name: &str) -> Result<(), StoreError> {
            if self.libraries.lock().unwrap().remove(name) {
                Ok(())
            } else {
                Err(StoreError::LibraryNotFound(name.to_string()))
            }
        }

        async fn add_file(
            &self,
            _library: &str,
            local_path: &Path,
        ) -> Result<Option<ParsingOutput>, StoreError> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            self.staged_file_seen
                .store(local_path.exists(), Ordering::SeqCst);

            if self.fail_parse {
                return Err(StoreError::Parse(
                    crate::store::parser::ParseError::UnsupportedFormat("bin".to_string()),
                ));
            }
            Ok(self.parse_output.clone())
        }

        async fn install_embeddings(
            &self,
            library: &str,
            _model_name: &str,
        ) -> Result<Vec<EmbeddingStatus>, StoreError> {
            self.library_card(library).await?;
            Ok(vec![EmbeddingStatus::default()])
        }

        async fn embedding_status(
            &self,
            _library: &str,
        ) -> Result<Vec<EmbeddingStatus>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        server: MockServer,
        staging: tempfile::TempDir,
        store: Arc<MockStore>,
        coordinator: IngestionCoordinator,
    }

    async fn harness(store: MockStore) -> Harness {
        let server = MockServer::start_async().await;
        let staging = tempfile::tempdir().unwrap();
        let fetcher = BlobFetcher::new(staging.path(), Duration::from_secs(5)).unwrap();
        let store = Arc::new(store);
        let coordinator = IngestionCoordinator::new(store.clone(), fetcher);
        Harness {
            server,
            staging,
            store,
            coordinator,
        }
    }

    fn request(h: &Harness, path: &str, library: &str) -> IngestionRequest {
        IngestionRequest {
            filename: path.trim_start_matches('/').to_string(),
            library_name: library.to_string(),
            blob_uri: h.server.url(path),
        }
    }

    fn staging_is_empty(h: &Harness) -> bool {
        std::fs::read_dir(h.staging.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_ingest_success_passes_parser_output_through() {
        let mut output = ParsingOutput::new();
        output.insert("docs_added".to_string(), json!(1));
        output.insert("blocks_added".to_string(), json!(7));

        let h = harness(MockStore::with_parse_output(output.clone())).await;
        h.server
            .mock_async(|when, then| {
                when.method(GET).path("/a.txt");
                then.status(200).body("some document text");
            })
            .await;

        let report = h
            .coordinator
            .ingest(request(&h, "/a.txt", "lib1"))
            .await
            .unwrap();

        assert_eq!(report.library_name, "lib1");
        assert_eq!(report.filename, "a.txt");
        assert_eq!(report.parsing_output, output);
        // The staged file existed while the parser ran and is gone now.
        assert!(h.store.staged_file_seen.load(Ordering::SeqCst));
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_stage_and_skips_parse() {
        let h = harness(MockStore::default()).await;
        h.server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.pdf");
                then.status(404);
            })
            .await;

        let err = h
            .coordinator
            .ingest(request(&h, "/missing.pdf", "lib1"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Fetch(_)));
        assert_eq!(h.store.parses.load(Ordering::SeqCst), 0);
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn test_parse_failure_still_removes_staged_file() {
        let h = harness(MockStore::failing_parse()).await;
        h.server
            .mock_async(|when, then| {
                when.method(GET).path("/a.bin");
                then.status(200).body("not parseable");
            })
            .await;

        let err = h
            .coordinator
            .ingest(request(&h, "/a.bin", "lib1"))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Parse(_)));
        assert!(staging_is_empty(&h));
    }

    #[tokio::test]
    async fn test_existing_library_is_reused() {
        let h = harness(MockStore::default()).await;
        h.server
            .mock_async(|when, then| {
                when.method(GET).path_includes("/");
                then.status(200).body("text");
            })
            .await;

        h.coordinator
            .ingest(request(&h, "/a.txt", "lib1"))
            .await
            .unwrap();
        h.coordinator
            .ingest(request(&h, "/b.txt", "lib1"))
            .await
            .unwrap();

        assert_eq!(h.store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.parses.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_parser_output_becomes_empty_map() {
        let h = harness(MockStore::default()).await;
        h.server
            .mock_async(|when, then| {
                when.method(GET).path("/a.txt");
                then.status(200).body("text");
            })
            .await;

        let report = h
            .coordinator
            .ingest(request(&h, "/a.txt", "lib1"))
            .await
            .unwrap();

        assert!(report.parsing_output.is_empty());
    }

    #[tokio::test]
    async fn test_blank_fields_are_rejected_before_any_work() {
        let h = harness(MockStore::default()).await;

        let err = h
            .coordinator
            .ingest(IngestionRequest {
                filename: "  ".to_string(),
                library_name: "lib1".to_string(),
                blob_uri: h.server.url("/a.txt"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));

        let err = h
            .coordinator
            .ingest(IngestionRequest {
                filename: "a.txt".to_string(),
                library_name: String::new(),
                blob_uri: h.server.url("/a.txt"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidRequest(_)));

        assert_eq!(h.store.creates.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.parses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_fetch_stage() {
        let h = harness(MockStore::default()).await;

        let err = h
            .coordinator
            .ingest(IngestionRequest {
                filename: "a.txt".to_string(),
                library_name: "lib1".to_string(),
                blob_uri: "http://127.0.0.1:1/a.txt".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            IngestError::Fetch(fetch_err) => assert!(fetch_err.is_caller_fault()),
            other => panic!("expected fetch-stage error, got {other:?}"),
        }
        assert!(staging_is_empty(&h));
    }
}
