//! Append-only audit trail. Distinct from `tracing` output: `tracing` is
//! for operators watching the process; this is product-visible history
//! queryable per task or agent (the `view_action_log` tool).

use crate::error::AppResult;
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ActionLogEntry {
    pub id: i64,
    pub agent_id: Option<String>,
    pub action_type: String,
    pub task_id: Option<String>,
    pub timestamp: i64,
    pub details: serde_json::Value,
}

pub struct ActionLog {
    store: Arc<Store>,
}

impl ActionLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        agent_id: Option<&str>,
        action_type: &str,
        task_id: Option<&str>,
        details: serde_json::Value,
    ) -> AppResult<()> {
        let agent_id = agent_id.map(str::to_string);
        let action_type = action_type.to_string();
        let task_id = task_id.map(str::to_string);
        self.store
            .write(move |tx| {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                tx.execute(
                    "INSERT INTO action_log (agent_id, action_type, task_id, timestamp, details) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![agent_id, action_type, task_id, now, details.to_string()],
                )
                .map_err(crate::error::AppError::from)?;
                Ok(())
            })
            .await
    }

    /// Pages through the log for a specific task or agent, most recent
    /// first. `view_action_log` (category `basic`) is the only caller.
    pub async fn query(
        &self,
        task_id: Option<String>,
        agent_id: Option<String>,
        limit: usize,
    ) -> AppResult<Vec<ActionLogEntry>> {
        self.store
            .read(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, agent_id, action_type, task_id, timestamp, details FROM action_log
                         WHERE (?1 IS NULL OR task_id = ?1) AND (?2 IS NULL OR agent_id = ?2)
                         ORDER BY timestamp DESC LIMIT ?3",
                    )
                    .map_err(crate::error::AppError::from)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![task_id, agent_id, limit as i64],
                        |row| {
                            let details_str: String = row.get(5)?;
                            Ok(ActionLogEntry {
                                id: row.get(0)?,
                                agent_id: row.get(1)?,
                                action_type: row.get(2)?,
                                task_id: row.get(3)?,
                                timestamp: row.get(4)?,
                                details: serde_json::from_str(&details_str)
                                    .unwrap_or(serde_json::Value::Null),
                            })
                        },
                    )
                    .map_err(crate::error::AppError::from)?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(crate::error::AppError::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_queries_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let log = ActionLog::new(store);
        log.record(Some("agent-1"), "create_agent", None, serde_json::json!({}))
            .await
            .unwrap();
        let entries = log.query(None, Some("agent-1".to_string()), 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_type, "create_agent");
    }
}
