use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::embedder::DEFAULT_EMBEDDING_MODEL;

/// Total timeout for a single blob download, including redirects and body.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Service configuration, resolved once at startup and passed into
/// constructors. Nothing mutates it after `main` builds the app state.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Path to the LanceDB database directory.
    pub db_path: String,
    /// Directory where downloaded blobs are staged before parsing.
    pub staging_dir: PathBuf,
    /// Cache directory for embedding-model assets.
    pub model_cache_dir: PathBuf,
    /// Total timeout for a single blob download.
    pub fetch_timeout: Duration,
    /// Embedding model loaded at startup; sets the store's vector dimension.
    pub default_embedding_model: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            db_path: "data/librag.lance".to_string(),
            staging_dir: std::env::temp_dir(),
            model_cache_dir: PathBuf::from("data/models"),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            default_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Build configuration from `LIBRAG_*` environment variables, falling
    /// back to documented defaults. Malformed values are errors, not silent
    /// fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LIBRAG_BIND") {
            config.bind_addr = addr.parse().map_err(|e| ConfigError::Invalid {
                var: "LIBRAG_BIND",
                value: addr.clone(),
                reason: format!("{e}"),
            })?;
        }
        if let Ok(path) = std::env::var("LIBRAG_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(dir) = std::env::var("LIBRAG_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LIBRAG_MODEL_CACHE_DIR") {
            config.model_cache_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("LIBRAG_FETCH_TIMEOUT_SECS") {
            let parsed: u64 = secs.parse().map_err(|e| ConfigError::Invalid {
                var: "LIBRAG_FETCH_TIMEOUT_SECS",
                value: secs.clone(),
                reason: format!("{e}"),
            })?;
            config.fetch_timeout = Duration::from_secs(parsed);
        }
        if let Ok(model) = std::env::var("LIBRAG_EMBEDDING_MODEL") {
            config.default_embedding_model = model;
        }

        Ok(config)
    }
}
