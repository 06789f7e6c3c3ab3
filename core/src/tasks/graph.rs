use super::model::{Task, TaskPriority, TaskStatus};
use super::repo;
use crate::action_log::ActionLog;
use crate::auth::{Role, TokenInfo};
use crate::error::{AppError, AppResult};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSelfTaskInput {
    pub title: String,
    pub description: String,
    pub priority: Option<TaskPriority>,
    pub parent_task_id: Option<String>,
    pub depends_on: Vec<String>,
}

pub enum AssignMode {
    /// mode A: create exactly one task and assign it.
    Single {
        title: String,
        description: String,
        priority: TaskPriority,
    },
    /// mode B: create many tasks and assign each.
    Many(Vec<(String, String, TaskPriority)>),
    /// mode C: assign pre-existing unassigned tasks.
    Existing(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewTasksFilter {
    pub task_id: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOpResult {
    pub index: usize,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BulkOp {
    UpdateStatus { task_id: String, status: TaskStatus },
    UpdatePriority { task_id: String, priority: TaskPriority },
    AddNote { task_id: String, content: String },
    Reassign { task_id: String, agent_id: String },
}

const MAX_WORKLOAD_SCORE: i64 = 15;

pub struct TaskGraph {
    store: Arc<Store>,
}

impl TaskGraph {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn new_task_id() -> String {
        format!("task-{}", Uuid::new_v4().simple())
    }

    pub async fn create_self_task(
        &self,
        caller: &TokenInfo,
        input: CreateSelfTaskInput,
    ) -> AppResult<Task> {
        let caller_agent = caller.agent_id.clone();
        let is_admin = caller.role == Role::Admin;
        let title = input.title;
        let description = input.description;
        let priority = input.priority.unwrap_or(TaskPriority::Medium);
        let deps = input.depends_on;
        let mut parent = input.parent_task_id;

        self.store
            .write(move |tx| {
                // Non-admin callers must resolve a parent: explicit, else
                // their own current_task, else refuse.
                if !is_admin && parent.is_none() {
                    let agent_id = caller_agent.clone().ok_or_else(|| {
                        AppError::Unauthorized("agent identity required".into())
                    })?;
                    let current: Option<String> = tx
                        .query_row(
                            "SELECT current_task FROM agents WHERE id = ?1",
                            [&agent_id],
                            |r| r.get(0),
                        )
                        .map_err(AppError::from)?;
                    parent = current;
                }

                if parent.is_none() {
                    // Creating a root task: refuse if a phase is already active.
                    if let Some(active_root) = repo::find_active_phase(tx)? {
                        let candidates = repo::phase_descendants(tx, &active_root)?;
                        return Err(AppError::Conflict(format!(
                            "a phase is already active under root {active_root}; attach to one of: {}",
                            candidates.join(", ")
                        )));
                    }
                } else {
                    let parent_id = parent.as_ref().unwrap();
                    if !repo::task_exists(tx, parent_id)? {
                        return Err(AppError::NotFound(format!("parent task {parent_id}")));
                    }
                }

                for dep in &deps {
                    if !repo::task_exists(tx, dep)? {
                        return Err(AppError::DependencyMissing(format!("dependency {dep}")));
                    }
                }

                let id = Self::new_task_id();
                let now = repo::now_ms();
                let created_by = caller_agent.clone().unwrap_or_else(|| "admin".to_string());
                let deps_json = serde_json::to_string(&deps).unwrap_or_else(|_| "[]".into());

                tx.execute(
                    "INSERT INTO tasks (id, title, description, assigned_to, created_by, status, priority, parent_task, depends_on_tasks, created_at, updated_at)
                     VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                    rusqlite::params![
                        id,
                        title,
                        description,
                        created_by,
                        TaskStatus::Unassigned.as_str(),
                        priority.as_str(),
                        parent,
                        deps_json,
                        now,
                    ],
                )
                .map_err(AppError::from)?;

                repo::log_action(
                    tx,
                    caller_agent.as_deref(),
                    "create_self_task",
                    Some(&id),
                    &serde_json::json!({"parent_task": parent}),
                )?;

                repo::load_task(tx, &id)
            })
            .await
    }

    pub async fn assign_task(
        &self,
        caller: &TokenInfo,
        mode: AssignMode,
        agent_id: String,
        enforce_workload_gate: bool,
    ) -> AppResult<Vec<Task>> {
        if caller.role != Role::Admin {
            return Err(AppError::Unauthorized("assign_task requires admin".into()));
        }

        self.store
            .write(move |tx| {
                let agent_status: String = tx
                    .query_row(
                        "SELECT status FROM agents WHERE id = ?1",
                        [&agent_id],
                        |r| r.get(0),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => {
                            AppError::NotFound(format!("agent {agent_id}"))
                        }
                        e => AppError::from(e),
                    })?;
                if agent_status == "admin" {
                    return Err(AppError::Conflict("cannot assign tasks to an admin identity".into()));
                }

                let task_ids: Vec<String> = match mode {
                    AssignMode::Single {
                        title,
                        description,
                        priority,
                    } => {
                        vec![Self::insert_new_task(tx, &title, &description, priority, None, "admin")?]
                    }
                    AssignMode::Many(specs) => {
                        let mut ids = Vec::with_capacity(specs.len());
                        for (title, description, priority) in specs {
                            ids.push(Self::insert_new_task(
                                tx,
                                &title,
                                &description,
                                priority,
                                None,
                                "admin",
                            )?);
                        }
                        ids
                    }
                    AssignMode::Existing(ids) => {
                        for id in &ids {
                            let status: String = tx
                                .query_row("SELECT status FROM tasks WHERE id = ?1", [id], |r| r.get(0))
                                .map_err(|e| match e {
                                    rusqlite::Error::QueryReturnedNoRows => {
                                        AppError::NotFound(format!("task {id}"))
                                    }
                                    e => AppError::from(e),
                                })?;
                            if status != TaskStatus::Unassigned.as_str() {
                                return Err(AppError::Conflict(format!(
                                    "task {id} is not unassigned"
                                )));
                            }
                        }
                        ids
                    }
                };

                if enforce_workload_gate {
                    let score = Self::workload_score(tx, &agent_id)?;
                    if score + (task_ids.len() as i64) > MAX_WORKLOAD_SCORE {
                        return Err(AppError::Conflict(format!(
                            "agent {agent_id} workload score {score} would exceed the limit of {MAX_WORKLOAD_SCORE}"
                        )));
                    }
                }

                let now = repo::now_ms();
                for id in &task_ids {
                    tx.execute(
                        "UPDATE tasks SET assigned_to = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                        rusqlite::params![agent_id, TaskStatus::Pending.as_str(), now, id],
                    )
                    .map_err(AppError::from)?;
                }

                if let Some(first) = task_ids.first() {
                    tx.execute(
                        "UPDATE agents SET current_task = ?1, updated_at = ?2 WHERE id = ?3 AND current_task IS NULL",
                        rusqlite::params![first, now, agent_id],
                    )
                    .map_err(AppError::from)?;
                }

                repo::log_action(
                    tx,
                    None,
                    "assign_task",
                    None,
                    &serde_json::json!({"agent_id": agent_id, "task_ids": task_ids}),
                )?;

                task_ids.iter().map(|id| repo::load_task(tx, id)).collect()
            })
            .await
    }

    fn insert_new_task(
        tx: &rusqlite::Transaction,
        title: &str,
        description: &str,
        priority: TaskPriority,
        parent: Option<&str>,
        created_by: &str,
    ) -> AppResult<String> {
        let id = Self::new_task_id();
        let now = repo::now_ms();
        tx.execute(
            "INSERT INTO tasks (id, title, description, assigned_to, created_by, status, priority, parent_task, depends_on_tasks, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, '[]', ?8, ?8)",
            rusqlite::params![
                id,
                title,
                description,
                created_by,
                TaskStatus::Unassigned.as_str(),
                priority.as_str(),
                parent,
                now,
            ],
        )
        .map_err(AppError::from)?;
        Ok(id)
    }

    fn workload_score(tx: &rusqlite::Transaction, agent_id: &str) -> AppResult<i64> {
        let active: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE assigned_to = ?1 AND status IN ('pending','unassigned','in_progress')",
                [agent_id],
                |r| r.get(0),
            )
            .map_err(AppError::from)?;
        let high: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE assigned_to = ?1 AND priority = 'high' AND status IN ('pending','unassigned','in_progress')",
                [agent_id],
                |r| r.get(0),
            )
            .map_err(AppError::from)?;
        Ok(active + 2 * high)
    }

    pub async fn view_tasks(&self, caller: &TokenInfo, filter: ViewTasksFilter) -> AppResult<Vec<Task>> {
        let caller = caller.clone();
        self.store
            .read(move |conn| {
                if let Some(id) = &filter.task_id {
                    let task = repo::load_task(conn, id)?;
                    Self::authorize_view(&caller, &task)?;
                    return Ok(vec![task]);
                }

                let mut stmt = conn
                    .prepare("SELECT id FROM tasks ORDER BY created_at DESC")
                    .map_err(AppError::from)?;
                let ids: Vec<String> = stmt
                    .query_map([], |r| r.get::<_, String>(0))
                    .map_err(AppError::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(AppError::from)?;

                let mut out = Vec::new();
                for id in ids {
                    let task = repo::load_task(conn, &id)?;
                    if Self::authorize_view(&caller, &task).is_err() {
                        continue;
                    }
                    if let Some(status) = filter.status {
                        if task.status != status {
                            continue;
                        }
                    }
                    out.push(task);
                }
                Ok(out)
            })
            .await
    }

    /// Agents see their own tasks, unassigned tasks, and tasks they
    /// created. The spec leaves descendant-of-managed-hierarchy visibility
    /// an open question (DESIGN.md); this implementation does not extend
    /// visibility beyond the three cases above.
    fn authorize_view(caller: &TokenInfo, task: &Task) -> AppResult<()> {
        if caller.role == Role::Admin {
            return Ok(());
        }
        let agent_id = caller.agent_id.as_deref().unwrap_or("");
        if task.assigned_to.as_deref() == Some(agent_id)
            || task.assigned_to.is_none()
            || task.created_by == agent_id
        {
            Ok(())
        } else {
            Err(AppError::Unauthorized("task not visible to caller".into()))
        }
    }

    pub async fn update_task_status(
        &self,
        caller: &TokenInfo,
        ids: Vec<String>,
        new_status: TaskStatus,
        notes: Option<String>,
    ) -> AppResult<Vec<Task>> {
        let caller = caller.clone();
        self.store
            .write(move |tx| {
                for id in &ids {
                    let task = repo::load_task(tx, id)?;
                    if caller.role != Role::Admin
                        && task.assigned_to.as_deref() != caller.agent_id.as_deref()
                    {
                        return Err(AppError::Unauthorized(format!(
                            "caller may not update task {id}"
                        )));
                    }
                    tx.execute(
                        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![new_status.as_str(), repo::now_ms(), id],
                    )
                    .map_err(AppError::from)?;
                    if let Some(content) = &notes {
                        let author = caller.agent_id.clone().unwrap_or_else(|| "admin".into());
                        repo::append_note(tx, id, &author, content)?;
                    }
                    repo::log_action(
                        tx,
                        caller.agent_id.as_deref(),
                        "update_task_status",
                        Some(id),
                        &serde_json::json!({"new_status": new_status.as_str()}),
                    )?;
                }
                ids.iter().map(|id| repo::load_task(tx, id)).collect()
            })
            .await
    }

    pub async fn delete_task(
        &self,
        caller: &TokenInfo,
        ids: Vec<String>,
        cascade_children: bool,
        force_delete: bool,
        confirmation: Option<String>,
    ) -> AppResult<()> {
        if caller.role != Role::Admin {
            return Err(AppError::Unauthorized("delete_task requires admin".into()));
        }
        let multi_or_destructive = ids.len() > 1 || force_delete || cascade_children;
        if multi_or_destructive && confirmation.as_deref() != Some("DELETE") {
            return Err(AppError::BadRequest(
                "multi-task, forced, or cascading deletion requires confirmation=\"DELETE\"".into(),
            ));
        }

        self.store
            .write(move |tx| {
                for id in &ids {
                    Self::delete_one(tx, id, cascade_children, force_delete)?;
                }
                Ok(())
            })
            .await
    }

    fn delete_one(
        tx: &rusqlite::Transaction,
        id: &str,
        cascade_children: bool,
        force_delete: bool,
    ) -> AppResult<()> {
        if !repo::task_exists(tx, id)? {
            return Err(AppError::NotFound(format!("task {id}")));
        }

        let dependents: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT id, depends_on_tasks FROM tasks")
                .map_err(AppError::from)?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                })
                .map_err(AppError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(AppError::from)?;
            rows.into_iter()
                .filter(|(other_id, deps)| {
                    other_id != id
                        && serde_json::from_str::<Vec<String>>(deps)
                            .unwrap_or_default()
                            .iter()
                            .any(|d| d == id)
                })
                .map(|(other_id, _)| other_id)
                .collect()
        };

        if !dependents.is_empty() && !force_delete {
            return Err(AppError::Conflict(format!(
                "task {id} has dependents: {}",
                dependents.join(", ")
            )));
        }

        let children = repo::load_child_ids(tx, id)?;
        if cascade_children {
            for child in &children {
                Self::delete_one(tx, child, true, force_delete)?;
            }
        } else {
            for child in &children {
                tx.execute(
                    "UPDATE tasks SET parent_task = NULL, updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![repo::now_ms(), child],
                )
                .map_err(AppError::from)?;
            }
        }

        Self::purge_references(tx, id)?;

        tx.execute("DELETE FROM task_notes WHERE task_id = ?1", [id])
            .map_err(AppError::from)?;
        tx.execute("DELETE FROM tasks WHERE id = ?1", [id])
            .map_err(AppError::from)?;
        repo::log_action(tx, None, "delete_task", Some(id), &serde_json::json!({}))?;
        Ok(())
    }

    /// Purges `id` from every other task's `depends_on_tasks` list,
    /// preserving I-T3. I-T2 is maintained for free since `child_tasks` is
    /// always derived, never stored.
    fn purge_references(tx: &rusqlite::Transaction, id: &str) -> AppResult<()> {
        let mut stmt = tx
            .prepare("SELECT id, depends_on_tasks FROM tasks")
            .map_err(AppError::from)?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(AppError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::from)?;
        for (other_id, deps_json) in rows {
            let mut deps: Vec<String> = serde_json::from_str(&deps_json).unwrap_or_default();
            let before = deps.len();
            deps.retain(|d| d != id);
            if deps.len() != before {
                let updated = serde_json::to_string(&deps).unwrap_or_else(|_| "[]".into());
                tx.execute(
                    "UPDATE tasks SET depends_on_tasks = ?1 WHERE id = ?2",
                    rusqlite::params![updated, other_id],
                )
                .map_err(AppError::from)?;
            }
        }
        Ok(())
    }

    pub async fn bulk_task_operations(
        &self,
        caller: &TokenInfo,
        operations: Vec<BulkOp>,
    ) -> AppResult<Vec<BulkOpResult>> {
        let caller = caller.clone();
        self.store
            .write(move |tx| {
                let mut results = Vec::with_capacity(operations.len());
                for (index, op) in operations.into_iter().enumerate() {
                    Self::apply_bulk_op(tx, &caller, &op)?;
                    results.push(BulkOpResult {
                        index,
                        ok: true,
                        error: None,
                    });
                }
                Ok(results)
            })
            .await
    }

    fn apply_bulk_op(tx: &rusqlite::Transaction, caller: &TokenInfo, op: &BulkOp) -> AppResult<()> {
        match op {
            BulkOp::UpdateStatus { task_id, status } => {
                let task = repo::load_task(tx, task_id)?;
                if caller.role != Role::Admin && task.assigned_to.as_deref() != caller.agent_id.as_deref()
                {
                    return Err(AppError::Unauthorized(format!(
                        "caller may not update task {task_id}"
                    )));
                }
                tx.execute(
                    "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![status.as_str(), repo::now_ms(), task_id],
                )
                .map_err(AppError::from)?;
            }
            BulkOp::UpdatePriority { task_id, priority } => {
                if !repo::task_exists(tx, task_id)? {
                    return Err(AppError::NotFound(format!("task {task_id}")));
                }
                tx.execute(
                    "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![priority.as_str(), repo::now_ms(), task_id],
                )
                .map_err(AppError::from)?;
            }
            BulkOp::AddNote { task_id, content } => {
                if !repo::task_exists(tx, task_id)? {
                    return Err(AppError::NotFound(format!("task {task_id}")));
                }
                let author = caller.agent_id.clone().unwrap_or_else(|| "admin".into());
                repo::append_note(tx, task_id, &author, content)?;
            }
            BulkOp::Reassign { task_id, agent_id } => {
                if caller.role != Role::Admin {
                    return Err(AppError::Unauthorized("reassign requires admin".into()));
                }
                tx.execute(
                    "UPDATE tasks SET assigned_to = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![agent_id, repo::now_ms(), task_id],
                )
                .map_err(AppError::from)?;
            }
        }
        Ok(())
    }
}

pub async fn record_internal_error(action_log: &ActionLog, agent_id: Option<&str>, method: &str, err: &AppError) {
    if err.requires_action_log() {
        let _ = action_log
            .record(agent_id, "internal_error", None, serde_json::json!({"method": method, "error": err.to_string()}))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Arc<Store>, TaskGraph, TokenInfo) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let graph = TaskGraph::new(store.clone());
        let admin = TokenInfo {
            role: Role::Admin,
            agent_id: None,
        };
        (store, graph, admin)
    }

    async fn create_agent(store: &Arc<Store>, id: &str) {
        let id = id.to_string();
        store
            .write(move |tx| {
                tx.execute(
                    "INSERT INTO agents (id, token, capabilities, status, current_task, working_directory, color, created_at, updated_at)
                     VALUES (?1, ?1, '[]', 'active', NULL, '.', 0, 0, 0)",
                    [&id],
                )
                .unwrap();
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn second_root_task_is_refused_while_a_phase_is_active() {
        let (_store, graph, admin) = setup().await;
        graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root one".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();

        let err = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root two".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn root_task_is_allowed_once_the_active_phase_completes() {
        let (_store, graph, admin) = setup().await;
        let root = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root one".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();
        graph
            .update_task_status(&admin, vec![root.id], TaskStatus::Completed, None)
            .await
            .unwrap();

        let second = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root two".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();
        assert!(second.parent_task.is_none());
    }

    #[tokio::test]
    async fn bulk_task_operations_rolls_back_entirely_on_a_later_failure() {
        let (store, graph, admin) = setup().await;
        let task = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();

        let ops = vec![
            BulkOp::UpdatePriority {
                task_id: task.id.clone(),
                priority: TaskPriority::High,
            },
            BulkOp::UpdatePriority {
                task_id: "does-not-exist".into(),
                priority: TaskPriority::Low,
            },
        ];
        let err = graph.bulk_task_operations(&admin, ops).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let reloaded = store
            .read({
                let id = task.id.clone();
                move |conn| repo::load_task(conn, &id)
            })
            .await
            .unwrap();
        assert_eq!(reloaded.priority, TaskPriority::Medium);
    }

    #[tokio::test]
    async fn delete_task_without_cascade_orphans_children_and_preserves_i_t2() {
        let (store, graph, admin) = setup().await;
        let root = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();
        let child = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "child".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: Some(root.id.clone()),
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();

        graph
            .delete_task(&admin, vec![root.id.clone()], false, false, None)
            .await
            .unwrap();

        let reloaded = store
            .read({
                let id = child.id.clone();
                move |conn| repo::load_task(conn, &id)
            })
            .await
            .unwrap();
        assert!(reloaded.parent_task.is_none());
    }

    #[tokio::test]
    async fn delete_task_with_cascade_removes_descendants() {
        let (store, graph, admin) = setup().await;
        let root = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();
        let child = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "child".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: Some(root.id.clone()),
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();

        graph
            .delete_task(&admin, vec![root.id.clone()], true, false, Some("DELETE".into()))
            .await
            .unwrap();

        let err = store
            .read({
                let id = child.id.clone();
                move |conn| repo::load_task(conn, &id)
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn deleting_a_dependency_without_force_is_refused_preserving_i_t3() {
        let (_store, graph, admin) = setup().await;
        let root = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();
        let dependent = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "dependent".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: Some(root.id.clone()),
                    depends_on: vec![root.id.clone()],
                },
            )
            .await
            .unwrap();

        let err = graph
            .delete_task(&admin, vec![root.id.clone()], false, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        graph
            .delete_task(&admin, vec![root.id.clone()], false, true, Some("DELETE".into()))
            .await
            .unwrap();

        let reloaded = graph
            .view_tasks(&admin, ViewTasksFilter {
                task_id: Some(dependent.id.clone()),
                status: None,
            })
            .await
            .unwrap();
        assert!(reloaded[0].depends_on_tasks.is_empty());
    }

    #[tokio::test]
    async fn assign_task_enforces_workload_gate_when_requested() {
        let (_store, graph, admin) = setup().await;
        create_agent(&_store, "agent-1").await;

        let many: Vec<(String, String, TaskPriority)> = (0..16)
            .map(|i| (format!("t{i}"), "d".into(), TaskPriority::High))
            .collect();
        let err = graph
            .assign_task(&admin, AssignMode::Many(many), "agent-1".into(), true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn non_admin_cannot_delete_tasks() {
        let (_store, graph, admin) = setup().await;
        let root = graph
            .create_self_task(
                &admin,
                CreateSelfTaskInput {
                    title: "root".into(),
                    description: "d".into(),
                    priority: None,
                    parent_task_id: None,
                    depends_on: vec![],
                },
            )
            .await
            .unwrap();

        let agent_caller = TokenInfo {
            role: Role::Agent,
            agent_id: Some("agent-1".into()),
        };
        let err = graph
            .delete_task(&agent_caller, vec![root.id], false, false, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
