//! Blob fetcher: retrieves a remote resource into a process-private staged
//! file. Transport failures (bad URI, unreachable host, non-2xx status) are
//! distinguishable from local I/O faults so the API layer can map them to a
//! caller-input error rather than an internal one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on the sanitized filename used for the staged copy.
const MAX_FILENAME_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid blob URI '{0}'")]
    InvalidUri(String),

    #[error("unsafe filename '{0}'")]
    UnsafeFilename(String),

    #[error("failed to fetch '{uri}': {source}")]
    Transport {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetch of '{uri}' returned status {status}")]
    Status {
        uri: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to stage downloaded file: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether the failure is attributable to the caller's input (bad URI,
    /// unreachable origin, non-2xx response) rather than an internal fault.
    pub fn is_caller_fault(&self) -> bool {
        !matches!(self, FetchError::Io(_) | FetchError::Client(_))
    }
}

/// A downloaded blob staged on local disk. Owned by exactly one request;
/// the file is removed when the value is dropped, on every exit path
/// (success, parse failure, or cancellation).
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    source_uri: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed staged file"),
            // Already gone counts as cleaned up.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove staged file")
            }
        }
    }
}

/// Downloads blobs over HTTP(S) into a staging directory.
pub struct BlobFetcher {
    client: reqwest::Client,
    staging_dir: PathBuf,
}

impl BlobFetcher {
    /// Build a fetcher with redirect following and a bounded total timeout
    /// covering the whole request (connect, redirects, body).
    pub fn new(staging_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            staging_dir: staging_dir.into(),
        })
    }

    /// Fetch `uri` into a staged file named after the sanitized `filename`
    /// plus a uniqueness token, so concurrent requests for the same filename
    /// never collide. The returned [`StagedFile`] owns cleanup.
    pub async fn fetch(&self, uri: &str, filename: &str) -> Result<StagedFile, FetchError> {
        let url =
            reqwest::Url::parse(uri).map_err(|_| FetchError::InvalidUri(uri.to_string()))?;
        let safe_name = sanitize_filename(filename)?;

        debug!(uri, filename = %safe_name, "downloading blob");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                uri: uri.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                uri: uri.to_string(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                uri: uri.to_string(),
                source,
            })?;

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let local_path = self
            .staging_dir
            .join(format!("{}-{}", Uuid::new_v4(), safe_name));
        tokio::fs::write(&local_path, &body).await?;

        debug!(path = %local_path.display(), bytes = body.len(), "blob staged");
        Ok(StagedFile {
            path: local_path,
            source_uri: uri.to_string(),
        })
    }
}

/// Reduce an untrusted filename to a safe local staging name: keep only the
/// final path component, restrict the character set, and bound the length.
/// Names that reduce to nothing (e.g. `..`) are rejected.
pub fn sanitize_filename(raw: &str) -> Result<String, FetchError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();

    if cleaned.is_empty() || cleaned.len() > MAX_FILENAME_LEN {
        return Err(FetchError::UnsafeFilename(raw.to_string()));
    }

    Ok(cleaned)
}
