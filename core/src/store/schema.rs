use crate::error::{AppError, AppResult};
use rusqlite::Connection;

pub const VECTOR_TABLE: &str = "chunk_embeddings";

pub fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            token TEXT NOT NULL UNIQUE,
            capabilities TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            current_task TEXT,
            working_directory TEXT NOT NULL,
            color INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            terminated_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            assigned_to TEXT,
            created_by TEXT NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            parent_task TEXT,
            depends_on_tasks TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task);
        CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

        CREATE TABLE IF NOT EXISTS task_notes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            author TEXT NOT NULL,
            ts INTEGER NOT NULL,
            content TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_task_notes_task_id ON task_notes(task_id);

        CREATE TABLE IF NOT EXISTS context_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            description TEXT,
            updated_by TEXT NOT NULL,
            last_updated INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS action_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT,
            action_type TEXT NOT NULL,
            task_id TEXT,
            timestamp INTEGER NOT NULL,
            details TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_action_log_agent ON action_log(agent_id);
        CREATE INDEX IF NOT EXISTS idx_action_log_task ON action_log(task_id);

        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_ref TEXT NOT NULL,
            chunk_text TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            indexed_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_source_ref ON chunks(source_type, source_ref);

        CREATE TABLE IF NOT EXISTS index_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transport_sessions (
            id TEXT PRIMARY KEY,
            bound_agent_id TEXT,
            created_at INTEGER NOT NULL,
            last_heartbeat INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS session_state (
            session_id TEXT NOT NULL,
            key TEXT NOT NULL,
            data TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            PRIMARY KEY (session_id, key)
        );

        CREATE TABLE IF NOT EXISTS server_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| AppError::StoreUnavailable(e.to_string()))
}

/// Creates the `vec0` virtual table at `dim` width. Returns `Err` (caller
/// treats this as "vector unavailable", not fatal) if the extension never
/// registered or the table can't be created.
pub fn create_vector_table(conn: &Connection, dim: usize) -> AppResult<()> {
    let sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {VECTOR_TABLE} USING vec0(embedding float[{dim}])"
    );
    conn.execute(&sql, [])
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
    Ok(())
}

pub const TABLE_NAMES: &[&str] = &[
    "agents",
    "tasks",
    "task_notes",
    "context_entries",
    "action_log",
    "chunks",
    "index_metadata",
    "transport_sessions",
    "session_state",
];
