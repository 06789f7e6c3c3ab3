//! # core
//!
//! The Agent-MCP orchestration engine: a single embedded store shared by an
//! agent supervisor, a task graph, a knowledge indexer/retriever, a tool
//! registry, and the auth/provider adapters that back them. This crate has
//! no network layer of its own — `transport` drives it through
//! [`orchestrator::Orchestrator`].
//!
//! ## Main modules
//!
//! - [`store`]: the single embedded SQL store (write/read/health).
//! - [`auth`]: token issuance and verification, admin/agent roles.
//! - [`mux`]: thin wrapper over the external terminal multiplexer.
//! - [`provider`]: pluggable embedding/chat client with dimension normalization and fallback.
//! - [`indexer`]: background scan/chunk/embed cycle.
//! - [`retriever`]: hybrid retrieval merged under a token budget.
//! - [`tasks`]: task graph CRUD and invariants.
//! - [`context`]: project-context key/value entries, backup/restore.
//! - [`agents`]: agent lifecycle and worker session supervision.
//! - [`registry`]: name-keyed tool table with category gating.
//! - [`tools`]: the concrete tool handlers exposed over the wire protocol.
//! - [`resources`]: read-only resource surface (`agent://`, `task://`, ...).
//! - [`orchestrator`]: boot sequence, background tasks, graceful shutdown.
//! - [`action_log`]: append-only audit trail.
//! - [`error`]: the wire-stable error kinds of the whole crate.

pub mod action_log;
pub mod agents;
pub mod auth;
pub mod context;
pub mod error;
pub mod indexer;
pub mod mux;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod retriever;
pub mod store;
pub mod tasks;
pub mod tools;

pub use action_log::ActionLog;
pub use agents::{AgentRecord, AgentStatus, Supervisor};
pub use auth::{AuthError, Role, TokenInfo};
pub use context::{BackupEnvelope, ConsistencyReport, ContextEntry, ProjectContext};
pub use error::AppError;
pub use indexer::Indexer;
pub use mux::Multiplexer;
pub use orchestrator::Orchestrator;
pub use provider::{ChatMessage, Provider, ProviderChain};
pub use registry::{ToolCategory, ToolRegistry};
pub use retriever::{RetrieveOptions, RetrieveResult, Retriever};
pub use store::Store;
pub use tasks::{Task, TaskPriority, TaskStatus};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
