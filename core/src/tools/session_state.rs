//! `session_state` tools: small per-transport-session key/value scratch
//! space (§4.10 persisted state, `session_state` table), distinct from the
//! durable `rag` project context.
//!
//! [`crate::registry::Handler`] only carries the caller's token, not the
//! transport session id, so the transport layer injects the bound
//! session's id into `params` as `_session_id` before dispatch. Tools in
//! this module are the only ones that read it; every other tool ignores
//! the field. This is a deliberate seam rather than a protocol leak: the
//! wire protocol itself never exposes `_session_id` to callers (DESIGN.md).

use super::ToolContext;
use crate::auth::TokenInfo;
use crate::error::{AppError, AppResult};
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// How long a saved session-state entry survives without being refreshed.
const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(save_session_state_entry(ctx.clone()), enabled)?;
    registry.register(load_session_state_entry(ctx.clone()), enabled)?;
    registry.register(list_session_states_entry(ctx.clone()), enabled)?;
    registry.register(clear_session_state_entry(ctx.clone()), enabled)?;
    Ok(())
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn session_id_of(params: &Value) -> AppResult<String> {
    params
        .get("_session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("no bound transport session".into()))
}

#[derive(Deserialize)]
struct SaveParams {
    key: String,
    value: Value,
    ttl_seconds: Option<i64>,
}

fn save_session_state_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "save_session_state".to_string(),
        category: ToolCategory::SessionState,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "value": {},
                "ttl_seconds": {"type": "integer"}
            },
            "required": ["key", "value"]
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let session_id = session_id_of(&params)?;
                let params: SaveParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let expires_at = now() + params.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS);
                let data = params.value.to_string();
                ctx.store
                    .write(move |tx| {
                        tx.execute(
                            "INSERT INTO session_state (session_id, key, data, expires_at)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(session_id, key) DO UPDATE SET data = excluded.data, expires_at = excluded.expires_at",
                            rusqlite::params![session_id, params.key, data, expires_at],
                        )
                        .map_err(AppError::from)?;
                        Ok(())
                    })
                    .await?;
                Ok(json!({"saved": true}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct LoadParams {
    key: String,
}

fn load_session_state_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "load_session_state".to_string(),
        category: ToolCategory::SessionState,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"]
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let session_id = session_id_of(&params)?;
                let params: LoadParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let now_ts = now();
                let value: Option<String> = ctx
                    .store
                    .read(move |conn| {
                        conn.query_row(
                            "SELECT data FROM session_state WHERE session_id = ?1 AND key = ?2 AND expires_at > ?3",
                            rusqlite::params![session_id, params.key, now_ts],
                            |r| r.get(0),
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            e => Err(AppError::from(e)),
                        })
                    })
                    .await?;
                match value {
                    Some(raw) => {
                        let parsed: Value = serde_json::from_str(&raw).map_err(AppError::from)?;
                        Ok(json!({"found": true, "value": parsed}))
                    }
                    None => Ok(json!({"found": false, "value": Value::Null})),
                }
            })
        }),
    }
}

fn list_session_states_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "list_session_states".to_string(),
        category: ToolCategory::SessionState,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let session_id = session_id_of(&params)?;
                let now_ts = now();
                let keys: Vec<String> = ctx
                    .store
                    .read(move |conn| {
                        let mut stmt = conn
                            .prepare(
                                "SELECT key FROM session_state WHERE session_id = ?1 AND expires_at > ?2 ORDER BY key",
                            )
                            .map_err(AppError::from)?;
                        let rows = stmt
                            .query_map(rusqlite::params![session_id, now_ts], |r| r.get::<_, String>(0))
                            .map_err(AppError::from)?;
                        rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
                    })
                    .await?;
                Ok(json!({"keys": keys}))
            })
        }),
    }
}

#[derive(Deserialize, Default)]
struct ClearParams {
    key: Option<String>,
}

fn clear_session_state_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "clear_session_state".to_string(),
        category: ToolCategory::SessionState,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {"key": {"type": "string"}}
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let session_id = session_id_of(&params)?;
                let params: ClearParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let cleared = ctx
                    .store
                    .write(move |tx| {
                        let n = match &params.key {
                            Some(key) => tx
                                .execute(
                                    "DELETE FROM session_state WHERE session_id = ?1 AND key = ?2",
                                    rusqlite::params![session_id, key],
                                )
                                .map_err(AppError::from)?,
                            None => tx
                                .execute(
                                    "DELETE FROM session_state WHERE session_id = ?1",
                                    rusqlite::params![session_id],
                                )
                                .map_err(AppError::from)?,
                        };
                        Ok(n)
                    })
                    .await?;
                Ok(json!({"cleared": cleared}))
            })
        }),
    }
}
