//! `health`: a `basic`-category tool reporting store health, registered
//! tool count, and enabled categories (§4.11 boot diagnostics surfaced to
//! callers, not just operators). Also `view_action_log` (SPEC_FULL §2): a
//! read-only way to page through the audit trail every `internal` error
//! is required to leave behind.

use super::ToolContext;
use crate::auth::{Role, TokenInfo};
use crate::error::AppResult;
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

const DEFAULT_ACTION_LOG_LIMIT: usize = 50;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(health_entry(ctx.clone(), enabled.clone()), enabled)?;
    registry.register(view_action_log_entry(ctx.clone()), enabled)?;
    Ok(())
}

fn health_entry(ctx: ToolContext, enabled: BTreeSet<String>) -> ToolEntry {
    ToolEntry {
        name: "health".to_string(),
        category: ToolCategory::Basic,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: Arc::new(move |_caller: TokenInfo, _params: Value| {
            let ctx = ctx.clone();
            let enabled = enabled.clone();
            Box::pin(async move {
                let store_health = ctx.store.health().await?;
                Ok(json!({
                    "store": store_health,
                    "enabled_categories": enabled,
                }))
            })
        }),
    }
}

#[derive(Deserialize)]
struct ViewActionLogParams {
    task_id: Option<String>,
    agent_id: Option<String>,
    limit: Option<usize>,
}

/// An agent caller only ever sees its own entries; the `agent_id` filter is
/// forced rather than merely defaulted, so one agent can't page through
/// another's history.
fn view_action_log_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "view_action_log".to_string(),
        category: ToolCategory::Basic,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "agent_id": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1}
            }
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: ViewActionLogParams = serde_json::from_value(params)
                    .map_err(|e| crate::error::AppError::BadRequest(e.to_string()))?;
                let agent_id = match caller.role {
                    Role::Admin => params.agent_id,
                    Role::Agent => Some(caller.agent_id.clone().unwrap_or_default()),
                };
                let limit = params.limit.unwrap_or(DEFAULT_ACTION_LOG_LIMIT);
                let entries = ctx
                    .action_log
                    .query(params.task_id, agent_id, limit)
                    .await?;
                Ok(json!({"entries": entries}))
            })
        }),
    }
}
