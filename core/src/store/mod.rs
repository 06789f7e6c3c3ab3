//! The single embedded SQL store. One writer connection guarded by a mutex;
//! reads open short-lived connections against the same WAL file, mirroring
//! `rusqlite`'s recommended multi-reader/single-writer WAL usage.
//!
//! A vector extension (`sqlite-vec`) is loaded once per process via
//! `sqlite3_auto_extension`; every connection opened afterwards, including
//! the short-lived read connections, sees the `vec0` module. If the
//! extension fails to load, [`Store::vector_available`] reports `false` and
//! the retriever degrades to keyword-only mode rather than erroring.

mod health;
mod schema;

pub use health::HealthReport;

use crate::error::{AppError, AppResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

static VEC_EXTENSION_INIT: Once = Once::new();

fn register_vector_extension() {
    VEC_EXTENSION_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

pub struct Store {
    writer: Arc<Mutex<Connection>>,
    path: PathBuf,
    target_dim: usize,
    vector_available: AtomicBool,
}

impl Store {
    /// Opens (creating if absent) the database at `path`, runs schema setup,
    /// and attempts to bring up the vector table at `target_dim` width.
    pub fn open(path: impl AsRef<Path>, target_dim: usize) -> AppResult<Self> {
        register_vector_extension();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        }
        let conn = Connection::open(&path)
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
        schema::create_tables(&conn)?;
        let vector_available = schema::create_vector_table(&conn, target_dim).is_ok();

        Ok(Self {
            writer: Arc::new(Mutex::new(conn)),
            path,
            target_dim,
            vector_available: AtomicBool::new(vector_available),
        })
    }

    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    pub fn vector_available(&self) -> bool {
        self.vector_available.load(Ordering::Relaxed)
    }

    /// Serializable unit of work against the single writer connection. `f`
    /// runs on a blocking thread; any `Err` inside rolls the whole
    /// transaction back (never a partial commit).
    pub async fn write<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = writer
                .lock()
                .map_err(|_| AppError::Internal("writer lock poisoned".into()))?;
            let tx = conn
                .transaction()
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            let result = f(&tx)?;
            tx.commit()
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            Ok(result)
        })
        .await?
    }

    /// Snapshot read on a fresh short-lived connection; may run concurrently
    /// with the writer thanks to WAL mode.
    pub async fn read<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)
                .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
            f(&conn)
        })
        .await?
    }

    pub async fn health(&self) -> AppResult<HealthReport> {
        let vector_available = self.vector_available();
        self.read(move |conn| health::collect(conn, vector_available))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_schema_and_reports_health() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("state.db"), 8).unwrap();
        let health = store.health().await.unwrap();
        assert_eq!(health.rows.get("agents").copied(), Some(0));
        assert_eq!(health.rows.get("tasks").copied(), Some(0));
    }

    #[tokio::test]
    async fn write_rolls_back_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("state.db"), 8).unwrap();
        let result: AppResult<()> = store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO context_entries (key, value, description, updated_by, last_updated) VALUES ('k','\"v\"',NULL,'a',0)",
                    [],
                )
                .map_err(AppError::from)?;
                Err(AppError::BadRequest("forced rollback".into()))
            })
            .await;
        assert!(result.is_err());
        let count: i64 = store
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM context_entries", [], |r| r.get(0))
                    .map_err(AppError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
