//! The indexing cycle itself: enumerate candidate sources, hash-gate
//! unchanged ones, chunk and embed the rest, and upsert chunk/embedding
//! pairs in lockstep (I-C1) — §4.5.

use super::chunker::{chunk_text, ChunkParams};
use crate::error::{AppError, AppResult};
use crate::provider::ProviderChain;
use crate::store::Store;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sources per embedding batch, bounding memory per §5 backpressure.
const BATCH_SIZE: usize = 10;

const DENYLIST_DIRS: &[&str] = &[
    ".git",
    ".agent",
    "node_modules",
    "target",
    "dist",
    "build",
    ".venv",
    "venv",
    "__pycache__",
    ".next",
    ".cache",
];

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "rb", "c", "cpp", "h", "hpp", "sh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceType {
    Markdown,
    Code,
    Context,
    Task,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Markdown => "markdown",
            SourceType::Code => "code",
            SourceType::Context => "context",
            SourceType::Task => "task",
        }
    }
}

struct CandidateSource {
    source_type: SourceType,
    source_ref: String,
    content: String,
    updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct IndexCycleStats {
    pub scanned: usize,
    pub changed: usize,
    pub chunks_inserted: usize,
    pub coalesced: bool,
    pub cancelled: bool,
}

pub struct Indexer {
    store: Arc<Store>,
    provider: Arc<ProviderChain>,
    project_dir: PathBuf,
    chunk_params: ChunkParams,
    running: tokio::sync::Mutex<()>,
}

impl Indexer {
    pub fn new(store: Arc<Store>, provider: Arc<ProviderChain>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            provider,
            project_dir: project_dir.into(),
            chunk_params: ChunkParams::default(),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_chunk_params(mut self, params: ChunkParams) -> Self {
        self.chunk_params = params;
        self
    }

    /// Runs one cycle. A request while a cycle is already in flight is
    /// coalesced (dropped), reported via `stats.coalesced`.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> AppResult<IndexCycleStats> {
        let _guard = match self.running.try_lock() {
            Ok(g) => g,
            Err(_) => {
                return Ok(IndexCycleStats {
                    coalesced: true,
                    ..Default::default()
                })
            }
        };

        let mut stats = IndexCycleStats::default();
        let last_indexed = self.load_last_indexed().await?;

        let mut candidates = Vec::new();
        candidates.extend(self.scan_files(SourceType::Markdown, MARKDOWN_EXTENSIONS, last_indexed.markdown)?);
        candidates.extend(self.scan_files(SourceType::Code, CODE_EXTENSIONS, last_indexed.code)?);
        candidates.extend(self.scan_context(last_indexed.context).await?);
        candidates.extend(self.scan_tasks(last_indexed.task).await?);
        stats.scanned = candidates.len();

        let mut surviving = Vec::new();
        for candidate in candidates {
            let hash = content_hash(&candidate.content);
            let stored = self
                .load_stored_hash(candidate.source_type, &candidate.source_ref)
                .await?;
            if stored.as_deref() != Some(hash.as_str()) {
                surviving.push((candidate, hash));
            }
        }
        stats.changed = surviving.len();

        for batch in surviving.chunks(BATCH_SIZE) {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return Ok(stats);
            }
            let inserted = self.index_batch(batch).await?;
            stats.chunks_inserted += inserted;
        }

        self.update_last_indexed(SourceType::Markdown).await?;
        self.update_last_indexed(SourceType::Code).await?;
        self.update_last_indexed(SourceType::Context).await?;
        self.update_last_indexed(SourceType::Task).await?;

        Ok(stats)
    }

    async fn index_batch(&self, batch: &[(CandidateSource, String)]) -> AppResult<usize> {
        let texts: Vec<String> = batch
            .iter()
            .flat_map(|(c, _)| chunk_text(&c.content, self.chunk_params))
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.provider.embed(&text_refs).await?;

        let mut cursor = 0usize;
        let mut total_inserted = 0usize;
        for (candidate, hash) in batch {
            let chunks = chunk_text(&candidate.content, self.chunk_params);
            let n = chunks.len();
            let chunk_vectors = vectors[cursor..cursor + n].to_vec();
            cursor += n;

            let source_type = candidate.source_type;
            let source_ref = candidate.source_ref.clone();
            let hash = hash.clone();
            total_inserted += self
                .store
                .write(move |tx| {
                    remove_prior_chunks(tx, source_type, &source_ref)?;
                    let mut inserted = 0usize;
                    for (text, vector) in chunks.into_iter().zip(chunk_vectors) {
                        insert_chunk_with_embedding(tx, source_type, &source_ref, &text, &vector)?;
                        inserted += 1;
                    }
                    upsert_metadata(
                        tx,
                        &format!("hash_{}_{}", source_type.as_str(), source_ref),
                        &hash,
                    )?;
                    Ok(inserted)
                })
                .await?;
        }
        Ok(total_inserted)
    }

    fn scan_files(
        &self,
        source_type: SourceType,
        extensions: &[&str],
        since: i64,
    ) -> AppResult<Vec<CandidateSource>> {
        let mut out = Vec::new();
        let walker = ignore::WalkBuilder::new(&self.project_dir)
            .hidden(false)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| !DENYLIST_DIRS.contains(&name))
                    .unwrap_or(true)
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !extensions.contains(&ext) {
                continue;
            }
            let metadata = match std::fs::metadata(path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            if mtime <= since {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            let source_ref = relative_ref(&self.project_dir, path);
            out.push(CandidateSource {
                source_type,
                source_ref,
                content,
                updated_at: mtime,
            });
        }
        Ok(out)
    }

    async fn scan_context(&self, since: i64) -> AppResult<Vec<CandidateSource>> {
        self.store
            .read(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT key, value, last_updated FROM context_entries
                         WHERE last_updated > ?1 AND key NOT LIKE '__backup__%'",
                    )
                    .map_err(AppError::from)?;
                let rows = stmt
                    .query_map([since], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })
                    .map_err(AppError::from)?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)
                    .map(|rows| {
                        rows.into_iter()
                            .map(|(key, value, updated_at)| CandidateSource {
                                source_type: SourceType::Context,
                                source_ref: key,
                                content: value,
                                updated_at,
                            })
                            .collect()
                    })
            })
            .await
    }

    async fn scan_tasks(&self, since: i64) -> AppResult<Vec<CandidateSource>> {
        self.store
            .read(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, title, description, updated_at FROM tasks WHERE updated_at > ?1",
                    )
                    .map_err(AppError::from)?;
                let rows = stmt
                    .query_map([since], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })
                    .map_err(AppError::from)?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)
                    .map(|rows| {
                        rows.into_iter()
                            .map(|(id, title, description, updated_at)| CandidateSource {
                                source_type: SourceType::Task,
                                source_ref: id,
                                content: format!("{title}\n\n{description}"),
                                updated_at,
                            })
                            .collect()
                    })
            })
            .await
    }

    async fn load_last_indexed(&self) -> AppResult<LastIndexed> {
        self.store
            .read(|conn| {
                Ok(LastIndexed {
                    markdown: read_metadata_i64(conn, "last_indexed_markdown")?,
                    code: read_metadata_i64(conn, "last_indexed_code")?,
                    context: read_metadata_i64(conn, "last_indexed_context")?,
                    task: read_metadata_i64(conn, "last_indexed_task")?,
                })
            })
            .await
    }

    async fn load_stored_hash(&self, source_type: SourceType, source_ref: &str) -> AppResult<Option<String>> {
        let key = format!("hash_{}_{}", source_type.as_str(), source_ref);
        self.store
            .read(move |conn| {
                conn.query_row(
                    "SELECT value FROM index_metadata WHERE key = ?1",
                    [&key],
                    |r| r.get::<_, String>(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(AppError::from(e)),
                })
            })
            .await
    }

    async fn update_last_indexed(&self, source_type: SourceType) -> AppResult<()> {
        let key = format!("last_indexed_{}", source_type.as_str());
        let now = now_ms();
        self.store
            .write(move |tx| upsert_metadata(tx, &key, &now.to_string()))
            .await
    }
}

struct LastIndexed {
    markdown: i64,
    code: i64,
    context: i64,
    task: i64,
}

fn read_metadata_i64(conn: &rusqlite::Connection, key: &str) -> AppResult<i64> {
    conn.query_row(
        "SELECT value FROM index_metadata WHERE key = ?1",
        [key],
        |r| r.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
    .map(Ok)
    .unwrap_or(Ok(0))
}

fn upsert_metadata(tx: &rusqlite::Transaction, key: &str, value: &str) -> AppResult<()> {
    tx.execute(
        "INSERT INTO index_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )
    .map_err(AppError::from)?;
    Ok(())
}

/// Deletes prior chunk rows for `source_ref` and their paired embedding
/// rows (same rowid), preserving I-C1 across the delete.
fn remove_prior_chunks(tx: &rusqlite::Transaction, source_type: SourceType, source_ref: &str) -> AppResult<()> {
    let ids: Vec<i64> = {
        let mut stmt = tx
            .prepare("SELECT id FROM chunks WHERE source_type = ?1 AND source_ref = ?2")
            .map_err(AppError::from)?;
        stmt.query_map(rusqlite::params![source_type.as_str(), source_ref], |r| r.get(0))
            .map_err(AppError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)?
    };
    for id in ids {
        let _ = tx.execute("DELETE FROM chunk_embeddings WHERE rowid = ?1", [id]);
    }
    tx.execute(
        "DELETE FROM chunks WHERE source_type = ?1 AND source_ref = ?2",
        rusqlite::params![source_type.as_str(), source_ref],
    )
    .map_err(AppError::from)?;
    Ok(())
}

/// Inserts a chunk row, then an embedding row at the same rowid (I-C1),
/// inside the caller's transaction.
fn insert_chunk_with_embedding(
    tx: &rusqlite::Transaction,
    source_type: SourceType,
    source_ref: &str,
    text: &str,
    vector: &[f32],
) -> AppResult<i64> {
    tx.execute(
        "INSERT INTO chunks (source_type, source_ref, chunk_text, metadata, indexed_at) VALUES (?1, ?2, ?3, '{}', ?4)",
        rusqlite::params![source_type.as_str(), source_ref, text, now_ms()],
    )
    .map_err(AppError::from)?;
    let row_id = tx.last_insert_rowid();

    let vector_json = serde_json::to_string(vector).map_err(AppError::from)?;
    let embedding_insert = tx.execute(
        "INSERT INTO chunk_embeddings (rowid, embedding) VALUES (?1, ?2)",
        rusqlite::params![row_id, vector_json],
    );
    // A missing vector extension is a degraded-mode runtime state (§4.1),
    // not a hard failure: the chunk row still exists for keyword fallback.
    if let Err(e) = embedding_insert {
        tracing::debug!(error = %e, "skipping embedding row; vector index unavailable");
    }
    Ok(row_id)
}

fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

fn relative_ref(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatMessage, Provider};
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        fn native_dimension(&self) -> usize {
            4
        }
        async fn available(&self) -> bool {
            true
        }
        async fn warm_up(&self) -> AppResult<()> {
            Ok(())
        }
        async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3, 0.4]).collect())
        }
        async fn chat(&self, _messages: &[ChatMessage], _model: Option<&str>) -> AppResult<String> {
            Ok("ok".to_string())
        }
    }

    async fn setup() -> (tempfile::TempDir, Arc<Store>, Arc<ProviderChain>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join(".agent/state.db"), 4).unwrap());
        let chain = Arc::new(ProviderChain::new(vec![Arc::new(FixedProvider)], 4));
        (dir, store, chain)
    }

    #[tokio::test]
    async fn cycle_indexes_a_markdown_file_then_is_idempotent() {
        let (dir, store, chain) = setup().await;
        std::fs::write(dir.path().join("README.md"), "hello world ".repeat(200)).unwrap();

        let indexer = Indexer::new(store.clone(), chain, dir.path());
        let cancel = CancellationToken::new();
        let first = indexer.run_cycle(&cancel).await.unwrap();
        assert!(first.chunks_inserted > 0);

        let second = indexer.run_cycle(&cancel).await.unwrap();
        assert_eq!(second.chunks_inserted, 0);
        assert_eq!(second.changed, 0);
    }

    #[tokio::test]
    async fn concurrent_cycle_request_is_coalesced() {
        let (dir, store, chain) = setup().await;
        let indexer = Arc::new(Indexer::new(store, chain, dir.path()));
        let _guard = indexer.running.try_lock().unwrap();
        let cancel = CancellationToken::new();
        let stats = indexer.run_cycle(&cancel).await.unwrap();
        assert!(stats.coalesced);
    }
}
