//! fastembed wrapper. Model assets are cached on disk; the first
//! construction of a model downloads them, which is why `main` warms the
//! default model on a blocking thread before the server accepts traffic.

use std::path::Path;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

/// Model loaded at startup unless overridden by configuration.
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-small-en-v1.5";

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("unknown embedding model '{0}'")]
    UnknownModel(String),

    #[error("failed to initialize embedding model: {0}")]
    Init(#[from] anyhow::Error),

    #[error("embedding generation failed: {0}")]
    Embed(String),
}

/// Map a public model name to its fastembed variant and vector dimension.
pub fn parse_model_name(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Some((EmbeddingModel::BGELargeENV15, 1024)),
        "all-minilm-l6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-minilm-l12-v2" => Some((EmbeddingModel::AllMiniLML12V2, 384)),
        _ => None,
    }
}

/// Whether the model cache already holds any downloaded assets. Used only
/// for startup logging; fastembed decides what to (re-)download.
pub fn model_assets_present(cache_dir: &Path) -> bool {
    std::fs::read_dir(cache_dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Wraps a fastembed model. Holds loaded model weights in memory.
pub struct Embedder {
    model: TextEmbedding,
    model_name: String,
    dimension: usize,
}

impl Embedder {
    /// Initialize the default model (384 dimensions).
    pub fn new(cache_dir: &Path) -> Result<Self, EmbedError> {
        Self::with_model(cache_dir, DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_model(cache_dir: &Path, name: &str) -> Result<Self, EmbedError> {
        let (model, dimension) =
            parse_model_name(name).ok_or_else(|| EmbedError::UnknownModel(name.to_string()))?;

        let model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )?;

        Ok(Self {
            model,
            model_name: name.to_string(),
            dimension,
        })
    }

    /// Embed a single text. Convenience wrapper around batch.
    pub fn embed_one(&mut self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text])
            .map(|mut v| v.pop().unwrap_or_default())
    }

    /// Embed multiple texts in one call (more efficient).
    pub fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.model
            .embed(texts, None)
            .map_err(|e| EmbedError::Embed(e.to_string()))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_model_names() {
        let (_, dim) = parse_model_name("bge-small-en-v1.5").unwrap();
        assert_eq!(dim, 384);
        let (_, dim) = parse_model_name("bge-base-en-v1.5").unwrap();
        assert_eq!(dim, 768);
    }

    #[test]
    fn test_parse_unknown_model_name() {
        assert!(parse_model_name("text-embedding-3-small").is_none());
        assert!(parse_model_name("").is_none());
    }

    #[test]
    fn test_model_assets_present_on_missing_dir() {
        assert!(!model_assets_present(Path::new("/definitely/not/a/dir")));
    }

    // Integration tests - only run if model download is acceptable
    #[test]
    #[ignore = "downloads model, run with --ignored"]
    fn test_embedder_produces_correct_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let mut embedder = Embedder::new(dir.path()).expect("failed to init embedder");
        let embedding = embedder.embed_one("test text").expect("failed to embed");

        assert_eq!(embedding.len(), 384);
        assert_eq!(embedder.dimension(), 384);
    }

    #[test]
    #[ignore = "downloads model, run with --ignored"]
    fn test_embed_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut embedder = Embedder::new(dir.path()).expect("failed to init embedder");
        let embeddings = embedder.embed_batch(&[]).expect("failed to embed");

        assert!(embeddings.is_empty());
    }
}
