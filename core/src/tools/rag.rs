//! `rag` query-side tools: `ask_project_rag`, `get_rag_status` (§4.6), over
//! [`crate::retriever::Retriever`].

use super::ToolContext;
use crate::auth::TokenInfo;
use crate::error::{AppError, AppResult};
use crate::registry::{Permission, ToolCategory, ToolEntry, ToolRegistry};
use crate::retriever::RetrieveOptions;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

pub fn register(
    registry: &mut ToolRegistry,
    ctx: &ToolContext,
    enabled: &BTreeSet<String>,
) -> AppResult<()> {
    registry.register(ask_project_rag_entry(ctx.clone()), enabled)?;
    registry.register(get_rag_status_entry(ctx.clone()), enabled)?;
    Ok(())
}

#[derive(Deserialize)]
struct AskParams {
    query: String,
    model: Option<String>,
    k: Option<usize>,
    token_budget: Option<usize>,
}

fn ask_project_rag_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "ask_project_rag".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "model": {"type": "string"},
                "k": {"type": "integer"},
                "token_budget": {"type": "integer"}
            },
            "required": ["query"]
        }),
        handler: Arc::new(move |_caller: TokenInfo, params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let params: AskParams = serde_json::from_value(params)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let defaults = RetrieveOptions::default();
                let options = RetrieveOptions {
                    k: params.k.unwrap_or(defaults.k),
                    token_budget: params.token_budget.unwrap_or(defaults.token_budget),
                };
                let result = ctx
                    .retriever
                    .answer_with_model(&params.query, params.model.as_deref(), options)
                    .await?;
                Ok(json!({
                    "answer": result.text,
                    "chunks": result.chunks,
                    "stats": result.stats,
                }))
            })
        }),
    }
}

fn get_rag_status_entry(ctx: ToolContext) -> ToolEntry {
    ToolEntry {
        name: "get_rag_status".to_string(),
        category: ToolCategory::Rag,
        permission: Permission::AnyRole,
        schema: json!({"type": "object", "properties": {}}),
        handler: Arc::new(move |_caller: TokenInfo, _params: Value| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let health = ctx.store.health().await?;
                Ok(json!({
                    "vector_available": ctx.store.vector_available(),
                    "target_dim": ctx.store.target_dim(),
                    "chunks_indexed": health.rows.get("chunks").copied().unwrap_or(0),
                }))
            })
        }),
    }
}
