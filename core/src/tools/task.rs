//! `task_management` tools over [`crate::tasks::TaskGraph`] /
//! [`crate::tasks::TaskSearch`] (§4.7).

use super::ToolContext;
use crate::auth::TokenInfo;
use crate::error::{AppError, AppResult};
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use crate::tasks::{
    AssignMode, BulkOp, CreateSelfTaskInput, SearchOptions, TaskPriority, TaskStatus,
    ViewTasksFilter,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(create_self_task_entry(ctx.clone()), enabled)?;
    registry.register(assign_task_entry(ctx.clone()), enabled)?;
    registry.register(view_tasks_entry(ctx.clone()), enabled)?;
    registry.register(update_task_status_entry(ctx.clone()), enabled)?;
    registry.register(search_tasks_entry(ctx.clone()), enabled)?;
    registry.register(delete_task_entry(ctx.clone()), enabled)?;
    registry.register(bulk_task_operations_entry(ctx.clone()), enabled)?;
    Ok(())
}

fn create_self_task_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "create_self_task".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                "parent_task_id": {"type": "string"},
                "depends_on": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title", "description"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let input: CreateSelfTaskInput = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let task = ctx.tasks.create_self_task(&caller, input).await?;
                Ok(json!({"task": task}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct TaskSpec {
    title: String,
    description: String,
    #[serde(default)]
    priority: Option<TaskPriority>,
}

#[derive(Deserialize)]
struct AssignTaskParams {
    agent_id: String,
    task_title: Option<String>,
    task_description: Option<String>,
    priority: Option<TaskPriority>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    task_ids: Vec<String>,
    #[serde(default)]
    enforce_workload_gate: bool,
}

fn assign_task_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "assign_task".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {
                "agent_id": {"type": "string"},
                "task_title": {"type": "string"},
                "task_description": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                "tasks": {"type": "array"},
                "task_ids": {"type": "array", "items": {"type": "string"}},
                "enforce_workload_gate": {"type": "boolean"}
            },
            "required": ["agent_id"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: AssignTaskParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;

                let mode = if let (Some(title), Some(description)) =
                    (params.task_title, params.task_description)
                {
                    AssignMode::Single {
                        title,
                        description,
                        priority: params.priority.unwrap_or(TaskPriority::Medium),
                    }
                } else if !params.tasks.is_empty() {
                    AssignMode::Many(
                        params
                            .tasks
                            .into_iter()
                            .map(|t| (t.title, t.description, t.priority.unwrap_or(TaskPriority::Medium)))
                            .collect(),
                    )
                } else if !params.task_ids.is_empty() {
                    AssignMode::Existing(params.task_ids)
                } else {
                    return Err(AppError::BadRequest(
                        "assign_task requires task_title+task_description, tasks[], or task_ids[]".into(),
                    ));
                };

                let tasks = ctx
                    .tasks
                    .assign_task(&caller, mode, params.agent_id, params.enforce_workload_gate)
                    .await?;
                Ok(json!({"tasks": tasks}))
            })
        }),
    }
}

fn view_tasks_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "view_tasks".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "status": {"type": "string", "enum": ["unassigned", "pending", "in_progress", "completed", "cancelled", "failed"]}
            }
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let filter: ViewTasksFilter = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let tasks = ctx.tasks.view_tasks(&caller, filter).await?;
                Ok(json!({"tasks": tasks}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct UpdateTaskStatusParams {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    ids: Vec<String>,
    status: TaskStatus,
    notes: Option<String>,
}

fn update_task_status_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "update_task_status".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "ids": {"type": "array", "items": {"type": "string"}},
                "status": {"type": "string", "enum": ["unassigned", "pending", "in_progress", "completed", "cancelled", "failed"]},
                "notes": {"type": "string"}
            },
            "required": ["status"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: UpdateTaskStatusParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let mut ids = params.ids;
                if let Some(id) = params.id {
                    ids.push(id);
                }
                if ids.is_empty() {
                    return Err(AppError::BadRequest("id or ids is required".into()));
                }
                let tasks = ctx
                    .tasks
                    .update_task_status(&caller, ids, params.status, params.notes)
                    .await?;
                Ok(json!({"tasks": tasks}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct SearchTasksParams {
    query: String,
    #[serde(default)]
    min_relevance_score: f64,
    #[serde(default)]
    include_notes: bool,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

fn search_tasks_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "search_tasks".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "min_relevance_score": {"type": "number"},
                "include_notes": {"type": "boolean"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: SearchTasksParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let results = ctx
                    .search
                    .search_tasks(
                        &caller,
                        &params.query,
                        SearchOptions {
                            min_relevance_score: params.min_relevance_score,
                            include_notes: params.include_notes,
                            limit: params.limit,
                        },
                    )
                    .await?;
                Ok(json!({"results": results}))
            })
        }),
    }
}

#[derive(Deserialize)]
struct DeleteTaskParams {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    cascade_children: bool,
    #[serde(default)]
    force_delete: bool,
    confirmation: Option<String>,
}

fn delete_task_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "delete_task".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AdminOnly,
        schema: json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "ids": {"type": "array", "items": {"type": "string"}},
                "cascade_children": {"type": "boolean"},
                "force_delete": {"type": "boolean"},
                "confirmation": {"type": "string"}
            }
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: DeleteTaskParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let mut ids = params.ids;
                if let Some(id) = params.id {
                    ids.push(id);
                }
                if ids.is_empty() {
                    return Err(AppError::BadRequest("id or ids is required".into()));
                }
                ctx.tasks
                    .delete_task(
                        &caller,
                        ids.clone(),
                        params.cascade_children,
                        params.force_delete,
                        params.confirmation,
                    )
                    .await?;
                Ok(json!({"deleted": ids}))
            })
        }),
    }
}

fn bulk_task_operations_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "bulk_task_operations".to_string(),
        category: ToolCategory::TaskManagement,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "operations": {"type": "array"}
            },
            "required": ["operations"]
        }),
        handler: Arc::new(move |caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let operations: Vec<BulkOp> = params
                    .get("operations")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e: serde_json::Error| AppError::BadRequest(e.to_string()))?
                    .ok_or_else(|| AppError::BadRequest("operations is required".into()))?;
                let results = ctx.tasks.bulk_task_operations(&caller, operations).await?;
                Ok(json!({"results": results}))
            })
        }),
    }
}
