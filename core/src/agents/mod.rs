//! Agent lifecycle: creation (including the standalone background-worker
//! variant), termination, failure detection against the multiplexer's live
//! session list, and the single-sourced bootstrap prompt template.

mod bootstrap;
mod model;
mod supervisor;

pub use bootstrap::build_bootstrap_prompt;
pub use model::{AgentRecord, AgentStatus};
pub use supervisor::{CreateAgentInput, Supervisor};
