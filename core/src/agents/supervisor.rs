use super::bootstrap::build_bootstrap_prompt;
use super::model::{AgentRecord, AgentStatus};
use crate::auth::{Auth, Role, TokenInfo};
use crate::error::{AppError, AppResult};
use crate::mux::Multiplexer;
use crate::store::Store;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Finite palette agents are assigned from, round-robin, for UI coloring.
const COLOR_PALETTE_SIZE: i64 = 12;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct CreateAgentInput {
    pub id: String,
    pub task_ids: Vec<String>,
    pub working_directory: String,
    pub capabilities: Vec<String>,
}

pub struct Supervisor {
    store: Arc<Store>,
    mux: Arc<Multiplexer>,
    endpoint: String,
    /// In-memory agent -> worker-session-name map. `DashMap`'s sharded
    /// locking keeps mutations short, matching this crate's preference for
    /// `dashmap` over a single `Mutex<HashMap<_>>`.
    sessions: DashMap<String, String>,
    working_dirs: DashMap<String, String>,
    next_color: AtomicUsize,
}

impl Supervisor {
    pub fn new(store: Arc<Store>, mux: Arc<Multiplexer>, endpoint: String) -> Self {
        Self {
            store,
            mux,
            endpoint,
            sessions: DashMap::new(),
            working_dirs: DashMap::new(),
            next_color: AtomicUsize::new(0),
        }
    }

    fn next_color_ordinal(&self) -> i64 {
        (self.next_color.fetch_add(1, Ordering::Relaxed) as i64) % COLOR_PALETTE_SIZE
    }

    pub async fn create_agent(
        &self,
        caller: &TokenInfo,
        input: CreateAgentInput,
    ) -> AppResult<(AgentRecord, String)> {
        if caller.role != Role::Admin {
            return Err(AppError::Unauthorized("create_agent requires admin".into()));
        }
        if input.task_ids.is_empty() {
            return Err(AppError::Conflict(
                "an agent must own at least one task at creation".into(),
            ));
        }

        let token = Auth::issue_agent_token();
        let color = self.next_color_ordinal();
        let id = input.id.clone();
        let task_ids = input.task_ids.clone();
        let working_directory = input.working_directory.clone();
        let capabilities_json =
            serde_json::to_string(&input.capabilities).unwrap_or_else(|_| "[]".into());
        let token_for_store = token.clone();

        let record = self
            .store
            .write(move |tx| {
                let exists: i64 = tx
                    .query_row("SELECT COUNT(*) FROM agents WHERE id = ?1", [&id], |r| r.get(0))
                    .map_err(AppError::from)?;
                if exists > 0 {
                    return Err(AppError::Conflict(format!("agent {id} already exists")));
                }

                for task_id in &task_ids {
                    let status: String = tx
                        .query_row("SELECT status FROM tasks WHERE id = ?1", [task_id], |r| r.get(0))
                        .map_err(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => {
                                AppError::NotFound(format!("task {task_id}"))
                            }
                            e => AppError::from(e),
                        })?;
                    if status != "unassigned" {
                        return Err(AppError::Conflict(format!(
                            "task {task_id} is not unassigned"
                        )));
                    }
                }

                let now = now_ms();
                tx.execute(
                    "INSERT INTO agents (id, token, capabilities, status, current_task, working_directory, color, created_at, updated_at, terminated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, NULL)",
                    rusqlite::params![
                        id,
                        token_for_store,
                        capabilities_json,
                        AgentStatus::Created.as_str(),
                        task_ids.first(),
                        working_directory,
                        color,
                        now,
                    ],
                )
                .map_err(AppError::from)?;

                for task_id in &task_ids {
                    tx.execute(
                        "UPDATE tasks SET assigned_to = ?1, status = 'pending', updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![id, now, task_id],
                    )
                    .map_err(AppError::from)?;
                }

                tx.execute(
                    "INSERT INTO action_log (agent_id, action_type, task_id, timestamp, details) VALUES (?1, 'create_agent', NULL, ?2, ?3)",
                    rusqlite::params![id, now, serde_json::json!({"task_ids": task_ids}).to_string()],
                )
                .map_err(AppError::from)?;

                load_agent(tx, &id)
            })
            .await?;

        self.sessions.insert(input.id.clone(), Multiplexer::sanitize_name(&input.id));
        self.working_dirs.insert(input.id.clone(), input.working_directory.clone());

        if self.mux.probe().await {
            let session_name = Multiplexer::sanitize_name(&input.id);
            if let Err(e) = self.mux.create(&session_name, &input.working_directory).await {
                tracing::warn!(agent = %input.id, error = %e, "failed to create worker session");
            } else {
                let prompt = build_bootstrap_prompt(&input.id, &token, &self.endpoint, &input.working_directory);
                if let Err(e) = self.mux.deliver_bootstrap(&session_name, &prompt).await {
                    tracing::warn!(agent = %input.id, error = %e, "failed to deliver bootstrap prompt");
                }
            }
        }

        Ok((record, token))
    }

    /// A reduced creation path for standalone auxiliary workers: no tasks,
    /// no hierarchical relationships, and no token handed back to the
    /// caller. Every agent row still needs a token to satisfy the unique
    /// column constraint, so this mints one internally and discards it
    /// (see DESIGN.md).
    pub async fn create_background_agent(
        &self,
        caller: &TokenInfo,
        id: String,
        working_directory: String,
    ) -> AppResult<AgentRecord> {
        if caller.role != Role::Admin {
            return Err(AppError::Unauthorized(
                "create_background_agent requires admin".into(),
            ));
        }
        let token = Auth::issue_agent_token();
        let color = self.next_color_ordinal();

        self.store
            .write(move |tx| {
                let exists: i64 = tx
                    .query_row("SELECT COUNT(*) FROM agents WHERE id = ?1", [&id], |r| r.get(0))
                    .map_err(AppError::from)?;
                if exists > 0 {
                    return Err(AppError::Conflict(format!("agent {id} already exists")));
                }
                let now = now_ms();
                tx.execute(
                    "INSERT INTO agents (id, token, capabilities, status, current_task, working_directory, color, created_at, updated_at, terminated_at)
                     VALUES (?1, ?2, '[]', ?3, NULL, ?4, ?5, ?6, ?6, NULL)",
                    rusqlite::params![
                        id,
                        token,
                        AgentStatus::Created.as_str(),
                        working_directory,
                        color,
                        now,
                    ],
                )
                .map_err(AppError::from)?;
                tx.execute(
                    "INSERT INTO action_log (agent_id, action_type, task_id, timestamp, details) VALUES (?1, 'create_background_agent', NULL, ?2, '{}')",
                    rusqlite::params![id, now],
                )
                .map_err(AppError::from)?;
                load_agent(tx, &id)
            })
            .await
    }

    pub async fn terminate_agent(&self, caller: &TokenInfo, id: String) -> AppResult<AgentRecord> {
        if caller.role != Role::Admin {
            return Err(AppError::Unauthorized("terminate_agent requires admin".into()));
        }
        let record = self
            .store
            .write(move |tx| {
                let now = now_ms();
                tx.execute(
                    "UPDATE tasks SET status = 'pending', assigned_to = NULL, updated_at = ?1 WHERE assigned_to = ?2",
                    rusqlite::params![now, id],
                )
                .map_err(AppError::from)?;
                tx.execute(
                    "UPDATE agents SET status = 'terminated', current_task = NULL, terminated_at = ?1, updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, id],
                )
                .map_err(AppError::from)?;
                tx.execute(
                    "INSERT INTO action_log (agent_id, action_type, task_id, timestamp, details) VALUES (?1, 'terminate_agent', NULL, ?1, '{}')",
                    rusqlite::params![id, now],
                )
                .map_err(AppError::from)?;
                load_agent(tx, &id)
            })
            .await?;

        if let Some((_, session_name)) = self.sessions.remove(&record.id) {
            if let Err(e) = self.mux.kill(&session_name).await {
                tracing::warn!(agent = %record.id, error = %e, "failed to kill worker session");
            }
        }
        self.working_dirs.remove(&record.id);
        Ok(record)
    }

    /// Checks every non-terminated agent's worker session against the
    /// multiplexer's live list; any agent whose session has disappeared is
    /// marked `failed` and its tasks unassigned identically to termination.
    pub async fn detect_failures(&self) -> AppResult<Vec<String>> {
        let live_sessions = self.mux.list().await.unwrap_or_default();
        let candidates: Vec<(String, String)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut failed = Vec::new();
        for (agent_id, session_name) in candidates {
            if live_sessions.contains(&session_name) {
                continue;
            }
            let still_active = self
                .store
                .read({
                    let agent_id = agent_id.clone();
                    move |conn| {
                        let status: String = conn
                            .query_row("SELECT status FROM agents WHERE id = ?1", [&agent_id], |r| r.get(0))
                            .map_err(AppError::from)?;
                        Ok(status != "terminated" && status != "failed" && status != "completed")
                    }
                })
                .await?;
            if !still_active {
                continue;
            }

            let agent_id_for_write = agent_id.clone();
            self.store
                .write(move |tx| {
                    let now = now_ms();
                    tx.execute(
                        "UPDATE tasks SET status = 'pending', assigned_to = NULL, updated_at = ?1 WHERE assigned_to = ?2",
                        rusqlite::params![now, agent_id_for_write],
                    )
                    .map_err(AppError::from)?;
                    tx.execute(
                        "UPDATE agents SET status = 'failed', current_task = NULL, updated_at = ?1 WHERE id = ?2",
                        rusqlite::params![now, agent_id_for_write],
                    )
                    .map_err(AppError::from)?;
                    Ok(())
                })
                .await?;
            self.sessions.remove(&agent_id);
            self.working_dirs.remove(&agent_id);
            failed.push(agent_id);
        }
        Ok(failed)
    }

    pub async fn list_agents(&self) -> AppResult<Vec<AgentRecord>> {
        self.store
            .read(|conn| {
                let mut stmt = conn
                    .prepare("SELECT id FROM agents ORDER BY created_at ASC")
                    .map_err(AppError::from)?;
                let ids: Vec<String> = stmt
                    .query_map([], |r| r.get::<_, String>(0))
                    .map_err(AppError::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)?;
                ids.iter().map(|id| load_agent(conn, id)).collect()
            })
            .await
    }

    pub fn workload_score_sync(conn: &rusqlite::Connection, agent_id: &str) -> AppResult<i64> {
        let active: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE assigned_to = ?1 AND status IN ('pending','unassigned','in_progress')",
                [agent_id],
                |r| r.get(0),
            )
            .map_err(AppError::from)?;
        let high: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE assigned_to = ?1 AND priority = 'high' AND status IN ('pending','unassigned','in_progress')",
                [agent_id],
                |r| r.get(0),
            )
            .map_err(AppError::from)?;
        Ok(active + 2 * high)
    }
}

fn load_agent(conn: &rusqlite::Connection, id: &str) -> AppResult<AgentRecord> {
    conn.query_row(
        "SELECT id, token, capabilities, status, current_task, working_directory, color, created_at, updated_at, terminated_at
         FROM agents WHERE id = ?1",
        [id],
        |row| {
            let capabilities_json: String = row.get(2)?;
            let status_str: String = row.get(3)?;
            Ok(AgentRecord {
                id: row.get(0)?,
                token: row.get(1)?,
                capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
                status: AgentStatus::parse(&status_str).unwrap_or(AgentStatus::Failed),
                current_task: row.get(4)?,
                working_directory: row.get(5)?,
                color: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
                terminated_at: row.get(9)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("agent {id}")),
        e => AppError::from(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Arc<Store>, Arc<Multiplexer>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let mux = Arc::new(Multiplexer::new("definitely-not-a-real-binary-xyz"));
        (store, mux)
    }

    #[tokio::test]
    async fn create_agent_assigns_first_task_as_current() {
        let (store, mux) = setup().await;
        let admin = TokenInfo {
            role: Role::Admin,
            agent_id: None,
        };
        store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO tasks (id, title, description, assigned_to, created_by, status, priority, parent_task, depends_on_tasks, created_at, updated_at)
                     VALUES ('t1','title','desc',NULL,'admin','unassigned','medium',NULL,'[]',0,0)",
                    [],
                )
                .unwrap();
                Ok(())
            })
            .await
            .unwrap();

        let supervisor = Supervisor::new(store, mux, "http://localhost:3001/mcp".to_string());
        let (record, token) = supervisor
            .create_agent(
                &admin,
                CreateAgentInput {
                    id: "idx-1".to_string(),
                    task_ids: vec!["t1".to_string()],
                    working_directory: "/tmp".to_string(),
                    capabilities: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(record.current_task.as_deref(), Some("t1"));
        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn create_agent_rejects_empty_task_list() {
        let (store, mux) = setup().await;
        let admin = TokenInfo {
            role: Role::Admin,
            agent_id: None,
        };
        let supervisor = Supervisor::new(store, mux, "http://localhost:3001/mcp".to_string());
        let err = supervisor
            .create_agent(
                &admin,
                CreateAgentInput {
                    id: "idx-1".to_string(),
                    task_ids: vec![],
                    working_directory: "/tmp".to_string(),
                    capabilities: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }
}
