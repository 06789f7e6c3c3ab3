//! `rag` (read/write side) tools over [`crate::context::ProjectContext`]
//! (§4.5): view/update/delete/backup/restore/validate of the shared
//! project-context key/value store.

use super::ToolContext;
use crate::auth::TokenInfo;
use crate::error::{AppError, AppResult};
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(view_project_context_entry(ctx.clone()), enabled)?;
    registry.register(update_project_context_entry(ctx.clone()), enabled)?;
    registry.register(bulk_update_project_context_entry(ctx.clone()), enabled)?;
    registry.register(delete_project_context_entry(ctx.clone()), enabled)?;
    registry.register(backup_project_context_entry(ctx.clone()), enabled)?;
    registry.register(validate_context_consistency_entry(ctx.clone()), enabled)?;
    Ok(())
}

fn caller_label(caller: &TokenInfo) -> String {
    caller.agent_id.clone().unwrap_or_else(|| "admin".to_string())
}

#[derive(Deserialize, Default)]
struct ViewParams {
    key: Option<String>,
}

fn view_project_context_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "view_project_context".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {"key": {"type": "string"}}
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: ViewParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let entries = ctx.context.view(params.key).await?;
                Ok(json!({"entries": entries}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct UpdateParams {
    key: String,
    value: Value,
    description: Option<String>,
}

fn update_project_context_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "update_project_context".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "value": {},
                "description": {"type": "string"}
            },
            "required": ["key", "value"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: UpdateParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let entry = ctx
                    .context
                    .update(params.key, params.value, params.description, caller_label(&caller))
                    .await?;
                Ok(json!({"entry": entry}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct BulkEntrySpec {
    key: String,
    value: Value,
    description: Option<String>,
}

#[derive(Deserialize)]
struct BulkUpdateParams {
    entries: Vec<BulkEntrySpec>,
}

fn bulk_update_project_context_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "bulk_update_project_context".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {"entries": {"type": "array"}},
            "required": ["entries"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: BulkUpdateParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let entries = params
                    .entries
                    .into_iter()
                    .map(|e| (e.key, e.value, e.description))
                    .collect();
                let entries = ctx.context.bulk_update(entries, caller_label(&caller)).await?;
                Ok(json!({"entries": entries}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct DeleteParams {
    key: String,
}

fn delete_project_context_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "delete_project_context".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"]
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: DeleteParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                ctx.context.delete(params.key.clone()).await?;
                Ok(json!({"deleted": params.key}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct RestoreParams {
    restore_from: Option<String>,
}

fn backup_project_context_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "backup_project_context".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {"restore_from": {"type": "string"}}
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: RestoreParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if let Some(backup_id) = params.restore_from {
                    let restored = ctx
                        .context
                        .restore_from(backup_id.clone(), caller_label(&caller))
                        .await?;
                    Ok(json!({"restored_from": backup_id, "entries_restored": restored}))
                } else {
                    let backup_id = ctx.context.backup(caller_label(&caller)).await?;
                    Ok(json!({"backup_id": backup_id}))
                }
            })
        }),
    }
}

fn validate_context_consistency_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "validate_context_consistency".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: Arc::new(move |_caller: TokenInfo, _params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let report = ctx.context.validate_consistency().await?;
                Ok(json!({"report": report}))
            })
        }),
    }
}
