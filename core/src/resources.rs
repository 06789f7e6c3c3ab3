//! Read-only resource surface (§4.12): `agent://`, `task://`, `tmux://`,
//! `token://` URIs, each with a short status-oriented description. Derived
//! fresh from store + supervisor state on every call — nothing here is
//! cached across requests.

use crate::agents::Supervisor;
use crate::auth::{Auth, Role, TokenInfo};
use crate::error::AppResult;
use crate::mux::Multiplexer;
use crate::tasks::{TaskGraph, ViewTasksFilter};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub description: String,
}

pub struct ResourceSurface {
    supervisor: Arc<Supervisor>,
    tasks: Arc<TaskGraph>,
    mux: Arc<Multiplexer>,
}

impl ResourceSurface {
    pub fn new(supervisor: Arc<Supervisor>, tasks: Arc<TaskGraph>, mux: Arc<Multiplexer>) -> Self {
        Self {
            supervisor,
            tasks,
            mux,
        }
    }

    /// Lists every addressable resource visible to `caller`. An agent
    /// caller's task listing is narrowed by `TaskGraph::view_tasks`'s own
    /// visibility rule; agent and tmux resources are always listed (their
    /// descriptions carry no task content) and token resources only for
    /// the caller's own identity.
    pub async fn list(&self, caller: &TokenInfo) -> AppResult<Vec<ResourceDescriptor>> {
        let (agents, visible_tasks, sessions) = tokio::try_join!(
            self.supervisor.list_agents(),
            self.tasks.view_tasks(caller, ViewTasksFilter::default()),
            async { Ok::<_, crate::error::AppError>(self.mux.list().await.unwrap_or_default()) },
        )?;

        let mut out = Vec::new();

        for agent in &agents {
            out.push(ResourceDescriptor {
                uri: format!("agent://{}", agent.id),
                description: format!(
                    "agent {} — {} ({} capabilities)",
                    agent.id,
                    agent.status.as_str(),
                    agent.capabilities.len()
                ),
            });
            if caller.role == Role::Admin || caller.agent_id.as_deref() == Some(agent.id.as_str()) {
                out.push(ResourceDescriptor {
                    uri: format!("token://{}", agent.id),
                    description: format!("masked token {}", Auth::fingerprint(&agent.token)),
                });
            }
        }

        for task in &visible_tasks {
            out.push(ResourceDescriptor {
                uri: format!("task://{}", task.id),
                description: format!(
                    "task {} — {} ({})",
                    task.title,
                    task.status.as_str(),
                    task.priority.as_str()
                ),
            });
        }

        for session in &sessions {
            out.push(ResourceDescriptor {
                uri: format!("tmux://{session}"),
                description: format!("worker session {session} is live"),
            });
        }

        Ok(out)
    }

    /// Resolves a single URI, re-deriving it from live state. `None` if the
    /// URI's scheme is unrecognized or the addressed item doesn't exist.
    pub async fn resolve(&self, caller: &TokenInfo, uri: &str) -> AppResult<Option<ResourceDescriptor>> {
        let all = self.list(caller).await?;
        Ok(all.into_iter().find(|r| r.uri == uri))
    }
}
