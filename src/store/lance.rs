//! LanceDB-backed library store. Each library gets its own chunk table;
//! library metadata and embedding-status records live in shared tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchIterator, StringArray, UInt64Array};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, connect};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::embedder::{Embedder, parse_model_name};
use super::parser;
use super::{
    EmbeddingStatus, LibraryCard, LibraryStore, ParsingOutput, StoreError, validate_library_name,
};

const CARDS_TABLE: &str = "library_cards";
const STATUS_TABLE: &str = "embedding_status";

/// Chunks embedded per model invocation.
const EMBEDDING_BATCH_SIZE: usize = 100;

/// One stored chunk row. `vector` is `None` until embeddings are installed;
/// unembedded rows carry a zero vector and an empty `embedding_model`.
#[derive(Debug, Clone)]
struct ChunkRow {
    chunk_id: String,
    filename: String,
    chunk_index: u64,
    text: String,
    content_hash: String,
    embedding_model: String,
    vector: Option<Vec<f32>>,
}

fn chunk_table_name(library: &str) -> String {
    format!("lib_{library}")
}

/// SHA256 of chunk text, CRLF-normalized for cross-OS consistency.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.replace("\r\n", "\n").as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct LanceLibraryStore {
    conn: Connection,
    dimension: usize,
    model_cache_dir: PathBuf,
    // One loaded model per name; embedding runs are serialized through this
    // lock because model inference needs exclusive access anyway.
    embedders: tokio::sync::Mutex<HashMap<String, Embedder>>,
}

impl LanceLibraryStore {
    /// Connect to LanceDB at the given path (creates if not exists). The
    /// bootstrap embedder fixes the store's vector dimension and seeds the
    /// model cache.
    pub async fn new(
        db_path: &str,
        model_cache_dir: PathBuf,
        bootstrap: Embedder,
    ) -> Result<Self, StoreError> {
        // Ensure parent directory exists (important for Docker bind mounts)
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = connect(db_path).execute().await?;

        let dimension = bootstrap.dimension();
        let mut embedders = HashMap::new();
        embedders.insert(bootstrap.model_name().to_string(), bootstrap);

        Ok(Self {
            conn,
            dimension,
            model_cache_dir,
            embedders: tokio::sync::Mutex::new(embedders),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Open-or-create append. LanceDB infers the table schema from the first
    /// batch.
    async fn upsert_batch(&self, table_name: &str, batch: RecordBatch) -> Result<(), StoreError> {
        let schema = batch.schema();

        match self.conn.open_table(table_name).execute().await {
            Ok(table) => {
                let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
                table.add(batches).execute().await?;
            }
            Err(_) => {
                let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
                self.conn
                    .create_table(table_name, batches)
                    .execute()
                    .await?;
            }
        }

        Ok(())
    }

    /// Collect all rows of a table matching a predicate; a missing table is
    /// an empty result, not an error.
    async fn query_rows(
        &self,
        table_name: &str,
        predicate: Option<String>,
    ) -> Result<Vec<RecordBatch>, StoreError> {
        let table = match self.conn.open_table(table_name).execute().await {
            Ok(t) => t,
            Err(_) => return Ok(Vec::new()),
        };

        let mut query = table.query();
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }

        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;
        Ok(batches)
    }

    async fn delete_where(&self, table_name: &str, predicate: &str) -> Result<(), StoreError> {
        let table = match self.conn.open_table(table_name).execute().await {
            Ok(t) => t,
            Err(_) => return Ok(()),
        };
        table.delete(predicate).await?;
        Ok(())
    }

    async fn find_card(&self, name: &str) -> Result<Option<LibraryCard>, StoreError> {
        let batches = self
            .query_rows(CARDS_TABLE, Some(format!("library_name = '{name}'")))
            .await?;

        for batch in &batches {
            let names = string_col(batch, "library_name");
            let created = string_col(batch, "created_at");
            let counts = u64_col(batch, "file_count");

            if let (Some(names), Some(created), Some(counts)) = (names, created, counts)
                && batch.num_rows() > 0
            {
                return Ok(Some(LibraryCard {
                    library_name: names.value(0).to_string(),
                    created_at: created.value(0).to_string(),
                    file_count: counts.value(0),
                }));
            }
        }

        Ok(None)
    }

    /// Replace a library's card row (LanceDB has no in-place update here, so
    /// delete-then-append).
    async fn replace_card(&self, card: &LibraryCard) -> Result<(), StoreError> {
        self.delete_where(
            CARDS_TABLE,
            &format!("library_name = '{}'", card.library_name),
        )
        .await?;
        self.upsert_batch(CARDS_TABLE, cards_to_batch(std::slice::from_ref(card))?)
            .await
    }

    async fn upsert_chunk_rows(&self, library: &str, rows: &[ChunkRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch = chunk_rows_to_batch(rows, self.dimension)?;
        self.upsert_batch(&chunk_table_name(library), batch).await
    }

    async fn unembedded_chunks(&self, library: &str) -> Result<Vec<ChunkRow>, StoreError> {
        let batches = self
            .query_rows(
                &chunk_table_name(library),
                Some("embedding_model = ''".to_string()),
            )
            .await?;

        let mut rows = Vec::new();
        for batch in &batches {
            let chunk_ids = string_col(batch, "chunk_id");
            let filenames = string_col(batch, "filename");
            let indexes = u64_col(batch, "chunk_index");
            let texts = string_col(batch, "text");
            let hashes = string_col(batch, "content_hash");

            if let (Some(ids), Some(files), Some(indexes), Some(texts), Some(hashes)) =
                (chunk_ids, filenames, indexes, texts, hashes)
            {
                for i in 0..batch.num_rows() {
                    rows.push(ChunkRow {
                        chunk_id: ids.value(i).to_string(),
                        filename: files.value(i).to_string(),
                        chunk_index: indexes.value(i),
                        text: texts.value(i).to_string(),
                        content_hash: hashes.value(i).to_string(),
                        embedding_model: String::new(),
                        vector: None,
                    });
                }
            }
        }

        Ok(rows)
    }

    /// Run one embedding batch on a blocking thread. The model is moved out
    /// of the cache for the duration of the call and put back afterwards.
    async fn embed_texts(
        &self,
        model_name: &str,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut embedders = self.embedders.lock().await;

        let mut embedder = match embedders.remove(model_name) {
            Some(e) => e,
            None => {
                let cache_dir = self.model_cache_dir.clone();
                let name = model_name.to_string();
                info!(model = model_name, "loading embedding model");
                tokio::task::spawn_blocking(move || Embedder::with_model(&cache_dir, &name))
                    .await??
            }
        };

        let (embedder, result) = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            let result = embedder.embed_batch(&refs);
            (embedder, result)
        })
        .await?;

        embedders.insert(model_name.to_string(), embedder);
        Ok(result?)
    }
}

#[async_trait]
impl LibraryStore for LanceLibraryStore {
    async fn load_or_create(&self, name: &str) -> Result<LibraryCard, StoreError> {
        validate_library_name(name)?;

        if let Some(card) = self.find_card(name).await? {
            debug!(library = name, "loaded existing library");
            return Ok(card);
        }

        let card = LibraryCard {
            library_name: name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            file_count: 0,
        };
        self.upsert_batch(CARDS_TABLE, cards_to_batch(std::slice::from_ref(&card))?)
            .await?;
        info!(library = name, "created new library");

        Ok(card)
    }

    async fn library_card(&self, name: &str) -> Result<LibraryCard, StoreError> {
        validate_library_name(name)?;
        self.find_card(name)
            .await?
            .ok_or_else(|| StoreError::LibraryNotFound(name.to_string()))
    }

    async fn list_libraries(&self) -> Result<Vec<String>, StoreError> {
        let batches = self.query_rows(CARDS_TABLE, None).await?;

        let mut names: Vec<String> = batches
            .iter()
            .flat_map(|batch| {
                string_col(batch, "library_name")
                    .map(|arr| {
                        (0..arr.len())
                            .filter(|&i| !arr.is_null(i))
                            .map(|i| arr.value(i).to_string())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .collect();

        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn delete_library(&self, name: &str) -> Result<(), StoreError> {
        // Existence check first so a missing name surfaces as 404, not as a
        // silent no-op.
        let _card = self.library_card(name).await?;

        // Chunk table may not exist yet if nothing was ingested.
        self.conn.drop_table(&chunk_table_name(name)).await.ok();
        self.delete_where(CARDS_TABLE, &format!("library_name = '{name}'"))
            .await?;
        self.delete_where(STATUS_TABLE, &format!("library_name = '{name}'"))
            .await?;

        info!(library = name, "deleted library");
        Ok(())
    }

    async fn add_file(
        &self,
        library: &str,
        local_path: &Path,
    ) -> Result<Option<ParsingOutput>, StoreError> {
        let card = self.library_card(library).await?;

        // Parsing is blocking (file reads, PDF extraction); keep it off the
        // request-handling threads.
        let path = local_path.to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parser::parse_file(&path)).await??;

        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| local_path.display().to_string());

        let rows: Vec<ChunkRow> = parsed
            .chunks
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRow {
                chunk_id: Uuid::new_v4().to_string(),
                filename: filename.clone(),
                chunk_index: i as u64,
                text: text.clone(),
                content_hash: content_hash(text),
                embedding_model: String::new(),
                vector: None,
            })
            .collect();

        let blocks_added = rows.len();
        self.upsert_chunk_rows(library, &rows).await?;

        self.replace_card(&LibraryCard {
            file_count: card.file_count + 1,
            ..card
        })
        .await?;

        info!(
            library,
            filename = %filename,
            blocks_added,
            "file parsed and stored"
        );

        let mut summary = ParsingOutput::new();
        summary.insert("docs_added".to_string(), json!(1));
        summary.insert("blocks_added".to_string(), json!(blocks_added));
        summary.insert("format".to_string(), json!(parsed.format.as_str()));
        summary.insert("filename".to_string(), json!(filename));
        Ok(Some(summary))
    }

    async fn install_embeddings(
        &self,
        library: &str,
        model_name: &str,
    ) -> Result<Vec<EmbeddingStatus>, StoreError> {
        let _card = self.library_card(library).await?;

        let (_, model_dim) = parse_model_name(model_name)
            .ok_or_else(|| StoreError::UnknownModel(model_name.to_string()))?;
        if model_dim != self.dimension {
            return Err(StoreError::DimensionMismatch {
                model_dim,
                store_dim: self.dimension,
            });
        }

        let pending = self.unembedded_chunks(library).await?;
        info!(
            library,
            model = model_name,
            pending = pending.len(),
            "installing embeddings"
        );

        let table_name = chunk_table_name(library);
        let mut embedded_blocks = 0u64;

        for batch in pending.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let vectors = self.embed_texts(model_name, texts).await?;

            // Rewrite the rows with their vectors: delete-then-append.
            let id_list = batch
                .iter()
                .map(|r| format!("'{}'", r.chunk_id))
                .collect::<Vec<_>>()
                .join(", ");
            self.delete_where(&table_name, &format!("chunk_id IN ({id_list})"))
                .await?;

            let rows: Vec<ChunkRow> = batch
                .iter()
                .zip(vectors)
                .map(|(row, vector)| ChunkRow {
                    embedding_model: model_name.to_string(),
                    vector: Some(vector),
                    ..row.clone()
                })
                .collect();
            embedded_blocks += rows.len() as u64;
            self.upsert_chunk_rows(library, &rows).await?;
        }

        let status = EmbeddingStatus {
            embedding_status: "completed".to_string(),
            embedded_blocks,
            embedding_model: model_name.to_string(),
            embedding_db: "lancedb".to_string(),
            time_stamp: Utc::now().to_rfc3339(),
        };

        // One status row per (library, model); re-installs replace it.
        self.delete_where(
            STATUS_TABLE,
            &format!("library_name = '{library}' AND embedding_model = '{model_name}'"),
        )
        .await?;
        self.upsert_batch(
            STATUS_TABLE,
            status_to_batch(library, std::slice::from_ref(&status))?,
        )
        .await?;

        info!(library, model = model_name, embedded_blocks, "embeddings complete");
        self.embedding_status(library).await
    }

    async fn embedding_status(&self, library: &str) -> Result<Vec<EmbeddingStatus>, StoreError> {
        let _card = self.library_card(library).await?;

        let batches = self
            .query_rows(STATUS_TABLE, Some(format!("library_name = '{library}'")))
            .await?;

        let mut statuses = Vec::new();
        for batch in &batches {
            let states = string_col(batch, "embedding_status");
            let blocks = u64_col(batch, "embedded_blocks");
            let models = string_col(batch, "embedding_model");
            let dbs = string_col(batch, "embedding_db");
            let stamps = string_col(batch, "time_stamp");

            if let (Some(states), Some(blocks), Some(models), Some(dbs), Some(stamps)) =
                (states, blocks, models, dbs, stamps)
            {
                for i in 0..batch.num_rows() {
                    statuses.push(EmbeddingStatus {
                        embedding_status: states.value(i).to_string(),
                        embedded_blocks: blocks.value(i),
                        embedding_model: models.value(i).to_string(),
                        embedding_db: dbs.value(i).to_string(),
                        time_stamp: stamps.value(i).to_string(),
                    });
                }
            }
        }

        Ok(statuses)
    }
}

// ============================================================================
// Arrow conversion functions (pure, no side effects)
// ============================================================================

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn u64_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a UInt64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
}

fn chunk_rows_to_batch(rows: &[ChunkRow], dim: usize) -> Result<RecordBatch, StoreError> {
    let chunk_ids: StringArray = rows.iter().map(|r| Some(r.chunk_id.as_str())).collect();
    let filenames: StringArray = rows.iter().map(|r| Some(r.filename.as_str())).collect();
    let indexes: UInt64Array = rows.iter().map(|r| Some(r.chunk_index)).collect();
    let texts: StringArray = rows.iter().map(|r| Some(r.text.as_str())).collect();
    let hashes: StringArray = rows.iter().map(|r| Some(r.content_hash.as_str())).collect();
    let models: StringArray = rows
        .iter()
        .map(|r| Some(r.embedding_model.as_str()))
        .collect();

    let mut vectors = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for row in rows {
        match &row.vector {
            Some(v) => {
                for x in v {
                    vectors.values().append_value(*x);
                }
            }
            None => {
                for _ in 0..dim {
                    vectors.values().append_value(0.0);
                }
            }
        }
        vectors.append(true);
    }

    RecordBatch::try_from_iter(vec![
        ("chunk_id", Arc::new(chunk_ids) as ArrayRef),
        ("filename", Arc::new(filenames) as ArrayRef),
        ("chunk_index", Arc::new(indexes) as ArrayRef),
        ("text", Arc::new(texts) as ArrayRef),
        ("content_hash", Arc::new(hashes) as ArrayRef),
        ("embedding_model", Arc::new(models) as ArrayRef),
        ("vector", Arc::new(vectors.finish()) as ArrayRef),
    ])
    .map_err(StoreError::Arrow)
}

fn cards_to_batch(cards: &[LibraryCard]) -> Result<RecordBatch, StoreError> {
    let names: StringArray = cards
        .iter()
        .map(|c| Some(c.library_name.as_str()))
        .collect();
    let created: StringArray = cards.iter().map(|c| Some(c.created_at.as_str())).collect();
    let counts: UInt64Array = cards.iter().map(|c| Some(c.file_count)).collect();

    RecordBatch::try_from_iter(vec![
        ("library_name", Arc::new(names) as ArrayRef),
        ("created_at", Arc::new(created) as ArrayRef),
        ("file_count", Arc::new(counts) as ArrayRef),
    ])
    .map_err(StoreError::Arrow)
}

fn status_to_batch(library: &str, statuses: &[EmbeddingStatus]) -> Result<RecordBatch, StoreError> {
    let libraries: StringArray = statuses.iter().map(|_| Some(library)).collect();
    let states: StringArray = statuses
        .iter()
        .map(|s| Some(s.embedding_status.as_str()))
        .collect();
    let blocks: UInt64Array = statuses.iter().map(|s| Some(s.embedded_blocks)).collect();
    let models: StringArray = statuses
        .iter()
        .map(|s| Some(s.embedding_model.as_str()))
        .collect();
    let dbs: StringArray = statuses
        .iter()
        .map(|s| Some(s.embedding_db.as_str()))
        .collect();
    let stamps: StringArray = statuses
        .iter()
        .map(|s| Some(s.time_stamp.as_str()))
        .collect();

    RecordBatch::try_from_iter(vec![
        ("library_name", Arc::new(libraries) as ArrayRef),
        ("embedding_status", Arc::new(states) as ArrayRef),
        ("embedded_blocks", Arc::new(blocks) as ArrayRef),
        ("embedding_model", Arc::new(models) as ArrayRef),
        ("embedding_db", Arc::new(dbs) as ArrayRef),
        ("time_stamp", Arc::new(stamps) as ArrayRef),
    ])
    .map_err(StoreError::Arrow)
}
