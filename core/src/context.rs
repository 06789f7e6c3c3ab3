//! Project-context entries: shared key/value storage agents use to
//! coordinate (§3 Data model, "Project-context entry"). Backups are stored
//! as reserved `__backup__<id>` rows whose value is a JSON envelope
//! `{backup_id, created_at, created_by, entry_count, entries}` (§6
//! Persisted state).

use crate::error::{AppError, AppResult};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const BACKUP_PREFIX: &str = "__backup__";

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub updated_by: String,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEnvelope {
    pub backup_id: String,
    pub created_at: i64,
    pub created_by: String,
    pub entry_count: usize,
    pub entries: Vec<ContextEntry>,
}

/// Reports entries that break I-C-style consistency expectations: a
/// `__backup__` row whose value does not parse as a [`BackupEnvelope`], or
/// whose JSON value is simply malformed.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ConsistencyReport {
    pub total_entries: usize,
    pub malformed_keys: Vec<String>,
    pub malformed_backups: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.malformed_keys.is_empty() && self.malformed_backups.is_empty()
    }
}

pub struct ProjectContext {
    store: Arc<Store>,
}

impl ProjectContext {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn reject_reserved(key: &str) -> AppResult<()> {
        if key.starts_with(BACKUP_PREFIX) {
            Err(AppError::BadRequest(format!(
                "key {key} uses the reserved backup prefix"
            )))
        } else {
            Ok(())
        }
    }

    pub async fn view(&self, key: Option<String>) -> AppResult<Vec<ContextEntry>> {
        self.store
            .read(move |conn| match &key {
                Some(key) => {
                    let entry = load_entry(conn, key)?;
                    Ok(vec![entry])
                }
                None => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT key FROM context_entries WHERE key NOT LIKE '__backup__%' ORDER BY last_updated DESC",
                        )
                        .map_err(AppError::from)?;
                    let keys: Vec<String> = stmt
                        .query_map([], |r| r.get::<_, String>(0))
                        .map_err(AppError::from)?
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(AppError::from)?;
                    keys.iter().map(|k| load_entry(conn, k)).collect()
                }
            })
            .await
    }

    pub async fn update(
        &self,
        key: String,
        value: serde_json::Value,
        description: Option<String>,
        updated_by: String,
    ) -> AppResult<ContextEntry> {
        Self::reject_reserved(&key)?;
        self.store
            .write(move |tx| {
                upsert_entry(tx, &key, &value, description.as_deref(), &updated_by)?;
                load_entry(tx, &key)
            })
            .await
    }

    pub async fn bulk_update(
        &self,
        entries: Vec<(String, serde_json::Value, Option<String>)>,
        updated_by: String,
    ) -> AppResult<Vec<ContextEntry>> {
        for (key, _, _) in &entries {
            Self::reject_reserved(key)?;
        }
        self.store
            .write(move |tx| {
                let mut out = Vec::with_capacity(entries.len());
                for (key, value, description) in &entries {
                    upsert_entry(tx, key, value, description.as_deref(), &updated_by)?;
                    out.push(load_entry(tx, key)?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete(&self, key: String) -> AppResult<()> {
        Self::reject_reserved(&key)?;
        self.store
            .write(move |tx| {
                let deleted = tx
                    .execute("DELETE FROM context_entries WHERE key = ?1", [&key])
                    .map_err(AppError::from)?;
                if deleted == 0 {
                    return Err(AppError::NotFound(format!("context entry {key}")));
                }
                Ok(())
            })
            .await
    }

    /// Snapshots every non-backup entry into a new immutable `__backup__<id>`
    /// row and returns its id.
    pub async fn backup(&self, created_by: String) -> AppResult<String> {
        let backup_id = Uuid::new_v4().simple().to_string();
        self.store
            .write(move |tx| {
                let mut stmt = tx
                    .prepare(
                        "SELECT key FROM context_entries WHERE key NOT LIKE '__backup__%' ORDER BY key ASC",
                    )
                    .map_err(AppError::from)?;
                let keys: Vec<String> = stmt
                    .query_map([], |r| r.get::<_, String>(0))
                    .map_err(AppError::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)?;
                let entries: Vec<ContextEntry> =
                    keys.iter().map(|k| load_entry(tx, k)).collect::<AppResult<_>>()?;

                let envelope = BackupEnvelope {
                    backup_id: backup_id.clone(),
                    created_at: now_ms(),
                    created_by: created_by.clone(),
                    entry_count: entries.len(),
                    entries,
                };
                let backup_key = format!("{BACKUP_PREFIX}{backup_id}");
                let value = serde_json::to_value(&envelope).map_err(AppError::from)?;
                tx.execute(
                    "INSERT INTO context_entries (key, value, description, updated_by, last_updated) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        backup_key,
                        value.to_string(),
                        Some(format!("backup snapshot {backup_id}")),
                        created_by,
                        now_ms(),
                    ],
                )
                .map_err(AppError::from)?;
                Ok(backup_id)
            })
            .await
    }

    /// Restores every entry from `__backup__<backup_id>`, overwriting any
    /// current value at the same key. Does not delete entries absent from
    /// the snapshot.
    pub async fn restore_from(&self, backup_id: String, restored_by: String) -> AppResult<usize> {
        self.store
            .write(move |tx| {
                let backup_key = format!("{BACKUP_PREFIX}{backup_id}");
                let raw: String = tx
                    .query_row(
                        "SELECT value FROM context_entries WHERE key = ?1",
                        [&backup_key],
                        |r| r.get(0),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => {
                            AppError::NotFound(format!("backup {backup_id}"))
                        }
                        e => AppError::from(e),
                    })?;
                let envelope: BackupEnvelope = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Internal(format!("corrupt backup {backup_id}: {e}"))
                })?;
                for entry in &envelope.entries {
                    upsert_entry(tx, &entry.key, &entry.value, entry.description.as_deref(), &restored_by)?;
                }
                Ok(envelope.entries.len())
            })
            .await
    }

    /// Walks every row and reports malformed JSON values or backup
    /// envelopes that don't parse — the spec never defines a repair path,
    /// only a read-only consistency check (DESIGN.md).
    pub async fn validate_consistency(&self) -> AppResult<ConsistencyReport> {
        self.store
            .read(|conn| {
                let mut stmt = conn
                    .prepare("SELECT key, value FROM context_entries")
                    .map_err(AppError::from)?;
                let rows: Vec<(String, String)> = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
                    .map_err(AppError::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)?;

                let mut report = ConsistencyReport {
                    total_entries: rows.len(),
                    ..Default::default()
                };
                for (key, value) in rows {
                    if serde_json::from_str::<serde_json::Value>(&value).is_err() {
                        report.malformed_keys.push(key.clone());
                        continue;
                    }
                    if key.starts_with(BACKUP_PREFIX)
                        && serde_json::from_str::<BackupEnvelope>(&value).is_err()
                    {
                        report.malformed_backups.push(key);
                    }
                }
                Ok(report)
            })
            .await
    }
}

fn upsert_entry(
    tx: &rusqlite::Transaction,
    key: &str,
    value: &serde_json::Value,
    description: Option<&str>,
    updated_by: &str,
) -> AppResult<()> {
    tx.execute(
        "INSERT INTO context_entries (key, value, description, updated_by, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, description = excluded.description,
            updated_by = excluded.updated_by, last_updated = excluded.last_updated",
        rusqlite::params![key, value.to_string(), description, updated_by, now_ms()],
    )
    .map_err(AppError::from)?;
    Ok(())
}

fn load_entry(conn: &rusqlite::Connection, key: &str) -> AppResult<ContextEntry> {
    conn.query_row(
        "SELECT key, value, description, updated_by, last_updated FROM context_entries WHERE key = ?1",
        [key],
        |row| {
            let value_str: String = row.get(1)?;
            Ok((
                row.get::<_, String>(0)?,
                value_str,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("context entry {key}")),
        e => AppError::from(e),
    })
    .and_then(|(key, value_str, description, updated_by, last_updated)| {
        Ok(ContextEntry {
            key,
            value: serde_json::from_str(&value_str).map_err(AppError::from)?,
            description,
            updated_by,
            last_updated,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Arc<Store> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap())
    }

    #[tokio::test]
    async fn update_then_view_returns_latest_value() {
        let store = setup().await;
        let ctx = ProjectContext::new(store);
        ctx.update(
            "k".to_string(),
            serde_json::json!({"a": 1}),
            None,
            "agent-1".to_string(),
        )
        .await
        .unwrap();
        ctx.update(
            "k".to_string(),
            serde_json::json!({"a": 2}),
            None,
            "agent-1".to_string(),
        )
        .await
        .unwrap();
        let entries = ctx.view(Some("k".to_string())).await.unwrap();
        assert_eq!(entries[0].value, serde_json::json!({"a": 2}));
    }

    #[tokio::test]
    async fn backup_then_delete_then_restore_round_trips() {
        let store = setup().await;
        let ctx = ProjectContext::new(store);
        ctx.update(
            "k".to_string(),
            serde_json::json!("v"),
            None,
            "agent-1".to_string(),
        )
        .await
        .unwrap();
        let backup_id = ctx.backup("admin".to_string()).await.unwrap();
        ctx.delete("k".to_string()).await.unwrap();
        assert!(ctx.view(Some("k".to_string())).await.is_err());

        ctx.restore_from(backup_id, "admin".to_string()).await.unwrap();
        let entries = ctx.view(Some("k".to_string())).await.unwrap();
        assert_eq!(entries[0].value, serde_json::json!("v"));
    }

    #[tokio::test]
    async fn reserved_prefix_is_rejected_on_write() {
        let store = setup().await;
        let ctx = ProjectContext::new(store);
        let err = ctx
            .update(
                "__backup__evil".to_string(),
                serde_json::json!(1),
                None,
                "agent-1".to_string(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn validate_consistency_reports_clean_store() {
        let store = setup().await;
        let ctx = ProjectContext::new(store);
        ctx.update("k".to_string(), serde_json::json!(1), None, "a".to_string())
            .await
            .unwrap();
        let report = ctx.validate_consistency().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.total_entries, 1);
    }
}
