//! The concrete tool handlers exposed over the wire protocol (§6 Tool
//! surface). Each submodule builds the [`crate::registry::ToolEntry`]
//! values for one tool-surface group; [`build_registry`] registers all of
//! them, gated by the boot-time `enabled_categories` set exactly as
//! `ToolRegistry::register` already enforces.
//!
//! Handlers are closures over `Arc<...>` services rather than one struct
//! per tool — the teacher's `Box<dyn Tool>`-by-name table generalizes
//! naturally to this shape since every handler here just needs a clone of
//! a few `Arc`s and a JSON in/out signature.

mod agent;
mod context;
mod health;
mod rag;
mod session_state;
mod task;

use crate::action_log::ActionLog;
use crate::agents::Supervisor;
use crate::context::ProjectContext;
use crate::error::AppResult;
use crate::registry::ToolRegistry;
use crate::retriever::Retriever;
use crate::store::Store;
use crate::tasks::{TaskGraph, TaskSearch};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Everything a tool handler might need. Cloned (cheaply — every field is
/// an `Arc`) into each closure at registration time.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<Store>,
    pub tasks: Arc<TaskGraph>,
    pub search: Arc<TaskSearch>,
    pub supervisor: Arc<Supervisor>,
    pub context: Arc<ProjectContext>,
    pub retriever: Arc<Retriever>,
    pub action_log: Arc<ActionLog>,
}

pub fn build_registry(
    ctx: ToolContext,
    enabled_categories: &BTreeSet<String>,
) -> AppResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    agent::register(&mut registry, &ctx, enabled_categories)?;
    task::register(&mut registry, &ctx, enabled_categories)?;
    context::register(&mut registry, &ctx, enabled_categories)?;
    rag::register(&mut registry, &ctx, enabled_categories)?;
    session_state::register(&mut registry, &ctx, enabled_categories)?;
    health::register(&mut registry, &ctx, enabled_categories)?;
    Ok(registry)
}
