//! Name-keyed tool table: `{schema, handler, category, permission}`, gated
//! by the boot-time `enabled_categories` configuration (§4.9). Generalizes
//! the teacher's `Box<dyn Tool>`-by-name table to a category-gated map of
//! schema + async handler, since this crate's tools are closures over
//! shared services rather than one struct per tool.

use crate::auth::{Role, TokenInfo};
use crate::error::{AppError, AppResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The closed set of tool categories a boot-time configuration toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolCategory {
    Basic,
    Rag,
    Memory,
    FileManagement,
    SessionState,
    AssistanceRequest,
    AgentManagement,
    TaskManagement,
    AgentCommunication,
    BackgroundAgents,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Basic => "basic",
            ToolCategory::Rag => "rag",
            ToolCategory::Memory => "memory",
            ToolCategory::FileManagement => "file_management",
            ToolCategory::SessionState => "session_state",
            ToolCategory::AssistanceRequest => "assistance_request",
            ToolCategory::AgentManagement => "agent_management",
            ToolCategory::TaskManagement => "task_management",
            ToolCategory::AgentCommunication => "agent_communication",
            ToolCategory::BackgroundAgents => "background_agents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "basic" => ToolCategory::Basic,
            "rag" => ToolCategory::Rag,
            "memory" => ToolCategory::Memory,
            "file_management" => ToolCategory::FileManagement,
            "session_state" => ToolCategory::SessionState,
            "assistance_request" => ToolCategory::AssistanceRequest,
            "agent_management" => ToolCategory::AgentManagement,
            "task_management" => ToolCategory::TaskManagement,
            "agent_communication" => ToolCategory::AgentCommunication,
            "background_agents" => ToolCategory::BackgroundAgents,
            _ => return None,
        })
    }
}

/// Whether a tool requires the caller to hold the admin role. Agent-role
/// tools are still subject to each handler's own finer-grained checks
/// (e.g. "only the assignee may update this task").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    AdminOnly,
    AnyRole,
}

pub type HandlerResult = Pin<Box<dyn Future<Output = AppResult<Value>> + Send>>;
pub type Handler = Arc<dyn Fn(TokenInfo, Value) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
pub struct ToolEntry {
    pub name: String,
    pub category: ToolCategory,
    pub permission: Permission,
    /// JSON Schema for the tool's parameters object, advertised verbatim to
    /// clients that list tools.
    pub schema: Value,
    pub handler: Handler,
}

/// Name-keyed table built once at boot. Registration is idempotent on
/// `name` — a second registration of the same name is an error, matching
/// §4.9 ("double-registration is an error").
#[derive(Default, Clone)]
pub struct ToolRegistry {
    entries: BTreeMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` only if its category is in `enabled_categories`;
    /// tools of disabled categories are silently skipped so they are never
    /// advertised or invocable (§4.9). Returns `Err` on a duplicate name
    /// regardless of whether the category is enabled, since a duplicate
    /// registration attempt is a programming error either way.
    pub fn register(
        &mut self,
        entry: ToolEntry,
        enabled_categories: &std::collections::BTreeSet<String>,
    ) -> AppResult<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(AppError::Internal(format!(
                "tool {} already registered",
                entry.name
            )));
        }
        if enabled_categories.contains(entry.category.as_str()) {
            self.entries.insert(entry.name.clone(), entry);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<(&str, ToolCategory, &Value)> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.category, &e.schema))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatches `name` with `params` after checking the caller's role
    /// against the tool's `Permission`. `not_found` if no enabled tool with
    /// this name exists; `unauthorized` if the role check fails.
    pub async fn call(&self, name: &str, caller: TokenInfo, params: Value) -> AppResult<Value> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("tool {name}")))?
            .clone();
        if entry.permission == Permission::AdminOnly && caller.role != Role::Admin {
            return Err(AppError::Unauthorized(format!(
                "tool {name} requires admin"
            )));
        }
        (entry.handler)(caller, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_entry(name: &str, category: ToolCategory) -> ToolEntry {
        ToolEntry {
            name: name.to_string(),
            category,
            permission: Permission::AnyRole,
            schema: serde_json::json!({"type": "object"}),
            handler: Arc::new(|_caller, _params| Box::pin(async { Ok(Value::Null) })),
        }
    }

    #[test]
    fn disabled_category_is_not_registered() {
        let mut registry = ToolRegistry::new();
        let enabled: std::collections::BTreeSet<String> = ["basic".to_string()].into();
        registry
            .register(noop_entry("create_agent", ToolCategory::AgentManagement), &enabled)
            .unwrap();
        assert!(registry.get("create_agent").is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry = ToolRegistry::new();
        let enabled: std::collections::BTreeSet<String> = ["basic".to_string()].into();
        registry
            .register(noop_entry("health", ToolCategory::Basic), &enabled)
            .unwrap();
        let err = registry
            .register(noop_entry("health", ToolCategory::Basic), &enabled)
            .unwrap_err();
        assert_eq!(err.code(), "internal");
    }

    #[tokio::test]
    async fn call_rejects_non_admin_on_admin_only_tool() {
        let mut registry = ToolRegistry::new();
        let enabled: std::collections::BTreeSet<String> = ["agent_management".to_string()].into();
        let mut entry = noop_entry("create_agent", ToolCategory::AgentManagement);
        entry.permission = Permission::AdminOnly;
        registry.register(entry, &enabled).unwrap();

        let agent_caller = TokenInfo {
            role: Role::Agent,
            agent_id: Some("a1".to_string()),
        };
        let err = registry
            .call("create_agent", agent_caller, Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }
}
