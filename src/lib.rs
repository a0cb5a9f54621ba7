//! librag — HTTP API for document libraries, remote-file ingestion, and
//! embedding generation over a LanceDB-backed RAG store.
//!
//! The service is glue: request/response mapping, temporary-file staging of
//! downloaded blobs, and lifecycle bootstrap. Parsing, chunking, vector
//! storage, and embedding-model invocation are delegated to the store layer
//! behind the [`store::LibraryStore`] trait.

pub mod api;
pub mod config;
pub mod fetch;
pub mod ingest;
pub mod store;
