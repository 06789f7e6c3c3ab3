//! `agent_management` tools: `create_agent`, `terminate_agent`,
//! `list_agents`, `view_status` (§4.8).

use super::ToolContext;
use crate::agents::CreateAgentInput;
use crate::auth::{Role, TokenInfo};
use crate::error::{AppError, AppResult};
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(create_agent_entry(ctx.clone()), enabled)?;
    registry.register(terminate_agent_entry(ctx.clone()), enabled)?;
    registry.register(list_agents_entry(ctx.clone()), enabled)?;
    registry.register(view_status_entry(ctx.clone()), enabled)?;
    Ok(())
}

#[derive(Deserialize)]
struct CreateAgentParams {
    agent_id: String,
    #[serde(default)]
    task_ids: Vec<String>,
    working_directory: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

fn create_agent_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "create_agent".to_string(),
        category: ToolCategory::AgentManagement,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "task_ids": {"type": "array", "items": {"type": "string"}},
                "working_directory": {"type": "string"},
                "capabilities": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["agent_id", "task_ids"]
        }),
        handler: std::sync::Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: CreateAgentParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let working_directory = params
                    .working_directory
                    .unwrap_or_else(|| ".".to_string());
                let (record, token) = ctx
                    .supervisor
                    .create_agent(
                        &caller,
                        CreateAgentInput {
                            id: params.agent_id,
                            task_ids: params.task_ids,
                            working_directory,
                            capabilities: params.capabilities,
                        },
                    )
                    .await?;
                ctx.action_log
                    .record(
                        None,
                        "create_agent",
                        None,
                        json!({"agent_id": record.id}),
                    )
                    .await?;
                Ok(json!({
                    "agent": record,
                    "token": token,
                    "attach_hint": format!("tmux attach -t {}", record.id),
                }))
            })
        }),
    }
}

fn terminate_agent_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "terminate_agent".to_string(),
        category: ToolCategory::AgentManagement,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {"agent_id": {"type": "string"}},
            "required": ["agent_id"]
        }),
        handler: std::sync::Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let agent_id = params
                    .get("agent_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::BadRequest("agent_id is required".into()))?
                    .to_string();
                let record = ctx.supervisor.terminate_agent(&caller, agent_id).await?;
                Ok(json!({"agent": record}))
            })
        }),
    }
}

/// Pairs each agent with its computed workload score (§4.7's `assign_task`
/// gate), so a caller can see why an assignment was refused instead of the
/// gate being opaque (SPEC_FULL §2 "workload score exposed read-only").
async fn agents_with_workload(ctx: &ToolContext) -> AppResult<Vec<Value>> {
    let agents = ctx.supervisor.list_agents().await?;
    let store = ctx.store.clone();
    store
        .read(move |conn| {
            agents
                .iter()
                .map(|a| {
                    let score = crate::agents::Supervisor::workload_score_sync(conn, &a.id)?;
                    let mut value = serde_json::to_value(a).map_err(AppError::from)?;
                    value["workload_score"] = json!(score);
                    Ok(value)
                })
                .collect::<AppResult<Vec<_>>>()
        })
        .await
}

fn list_agents_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "list_agents".to_string(),
        category: ToolCategory::AgentManagement,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: std::sync::Arc::new(move |_caller: TokenInfo, _params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let agents = agents_with_workload(&ctx).await?;
                Ok(json!({"agents": agents}))
            })
        }),
    }
}

fn view_status_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "view_status".to_string(),
        category: ToolCategory::Basic,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: std::sync::Arc::new(move |caller: TokenInfo, _params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                match caller.role {
                    Role::Admin => {
                        let agents = agents_with_workload(&ctx).await?;
                        Ok(json!({"role": "admin", "agents": agents}))
                    }
                    Role::Agent => {
                        let agent_id = caller.agent_id.clone().unwrap_or_default();
                        let agents = agents_with_workload(&ctx).await?;
                        let mine = agents.into_iter().find(|a| a["id"] == json!(agent_id));
                        Ok(json!({"role": "agent", "agent": mine}))
                    }
                }
            })
        }),
    }
}
