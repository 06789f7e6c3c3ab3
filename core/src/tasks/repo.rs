//! Row-mapping helpers shared by the task graph operations. All of these
//! run inside a `rusqlite::Transaction` or `Connection` borrow handed in by
//! `Store::write`/`Store::read`; none of them open a connection themselves.

use super::model::{Task, TaskNote, TaskPriority, TaskStatus};
use crate::error::{AppError, AppResult};
use rusqlite::Connection;

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn load_task(conn: &Connection, id: &str) -> AppResult<Task> {
    let (title, description, assigned_to, created_by, status, priority, parent_task, deps_json, created_at, updated_at): (
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        Option<String>,
        String,
        i64,
        i64,
    ) = conn
        .query_row(
            "SELECT title, description, assigned_to, created_by, status, priority, parent_task, depends_on_tasks, created_at, updated_at
             FROM tasks WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound(format!("task {id}")),
            e => AppError::from(e),
        })?;

    let child_tasks = load_child_ids(conn, id)?;
    let notes = load_notes(conn, id)?;
    let depends_on_tasks: Vec<String> = serde_json::from_str(&deps_json).unwrap_or_default();

    Ok(Task {
        id: id.to_string(),
        title,
        description,
        assigned_to,
        created_by,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| AppError::Internal(format!("corrupt status for task {id}")))?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| AppError::Internal(format!("corrupt priority for task {id}")))?,
        parent_task,
        child_tasks,
        depends_on_tasks,
        notes,
        created_at,
        updated_at,
    })
}

pub fn load_child_ids(conn: &Connection, parent_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM tasks WHERE parent_task = ?1 ORDER BY created_at ASC")
        .map_err(AppError::from)?;
    let rows = stmt
        .query_map([parent_id], |row| row.get::<_, String>(0))
        .map_err(AppError::from)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
}

pub fn load_notes(conn: &Connection, task_id: &str) -> AppResult<Vec<TaskNote>> {
    let mut stmt = conn
        .prepare("SELECT author, ts, content FROM task_notes WHERE task_id = ?1 ORDER BY ts ASC")
        .map_err(AppError::from)?;
    let rows = stmt
        .query_map([task_id], |row| {
            Ok(TaskNote {
                author: row.get(0)?,
                ts: row.get(1)?,
                content: row.get(2)?,
            })
        })
        .map_err(AppError::from)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
}

pub fn task_exists(conn: &Connection, id: &str) -> AppResult<bool> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tasks WHERE id = ?1", [id], |r| r.get(0))
        .map_err(AppError::from)?;
    Ok(count > 0)
}

pub fn append_note(conn: &Connection, task_id: &str, author: &str, content: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO task_notes (task_id, author, ts, content) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![task_id, author, now_ms(), content],
    )
    .map_err(AppError::from)?;
    Ok(())
}

pub fn log_action(
    conn: &Connection,
    agent_id: Option<&str>,
    action_type: &str,
    task_id: Option<&str>,
    details: &serde_json::Value,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO action_log (agent_id, action_type, task_id, timestamp, details) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![agent_id, action_type, task_id, now_ms(), details.to_string()],
    )
    .map_err(AppError::from)?;
    Ok(())
}

/// Recursively descends from `root_id` via `parent_task = ?`. Phase is
/// active iff any transitive descendant (or the root itself) is
/// non-terminal.
pub fn phase_active(conn: &Connection, root_id: &str) -> AppResult<bool> {
    let mut stack = vec![root_id.to_string()];
    while let Some(id) = stack.pop() {
        let status: String = conn
            .query_row("SELECT status FROM tasks WHERE id = ?1", [&id], |r| r.get(0))
            .map_err(AppError::from)?;
        let status = TaskStatus::parse(&status)
            .ok_or_else(|| AppError::Internal(format!("corrupt status for task {id}")))?;
        if status.is_active() {
            return Ok(true);
        }
        stack.extend(load_child_ids(conn, &id)?);
    }
    Ok(false)
}

/// All root tasks (`parent_task IS NULL`), most recently created first.
pub fn list_root_tasks_desc(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT id FROM tasks WHERE parent_task IS NULL ORDER BY created_at DESC")
        .map_err(AppError::from)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(AppError::from)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
}

/// The currently active phase, if any, tie-broken by most recently
/// created root (see DESIGN.md for the boot-time healing decision on
/// the inconsistent-data case).
pub fn find_active_phase(conn: &Connection) -> AppResult<Option<String>> {
    for root in list_root_tasks_desc(conn)? {
        if phase_active(conn, &root)? {
            return Ok(Some(root));
        }
    }
    Ok(None)
}

/// Every root task whose phase is active, used by the boot-time
/// consistency check (I-T4 should hold at rest: at most one). Historical
/// data can violate this; see DESIGN.md for the boot-refusal decision.
pub fn active_phase_roots(conn: &Connection) -> AppResult<Vec<String>> {
    let mut out = Vec::new();
    for root in list_root_tasks_desc(conn)? {
        if phase_active(conn, &root)? {
            out.push(root);
        }
    }
    Ok(out)
}

/// All ids in the active phase's subtree, used to suggest candidate
/// parents when a root-task creation is refused.
pub fn phase_descendants(conn: &Connection, root_id: &str) -> AppResult<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![root_id.to_string()];
    while let Some(id) = stack.pop() {
        let children = load_child_ids(conn, &id)?;
        out.push(id.clone());
        stack.extend(children);
    }
    Ok(out)
}
