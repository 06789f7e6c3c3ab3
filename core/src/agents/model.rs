use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Created,
    Active,
    Terminated,
    Failed,
    Completed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Created => "created",
            AgentStatus::Active => "active",
            AgentStatus::Terminated => "terminated",
            AgentStatus::Failed => "failed",
            AgentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "created" => AgentStatus::Created,
            "active" => AgentStatus::Active,
            "terminated" => AgentStatus::Terminated,
            "failed" => AgentStatus::Failed,
            "completed" => AgentStatus::Completed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Terminated | AgentStatus::Failed | AgentStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub id: String,
    /// Never serialized back out plaintext by the resource surface; see
    /// `crate::resources`.
    #[serde(skip_serializing)]
    pub token: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub working_directory: String,
    pub color: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub terminated_at: Option<i64>,
}
