//! Out-of-band frames pushed down the SSE stream: progress markers for a
//! long-running call, or a server-initiated event (e.g. an agent status
//! change). Unlike [`crate::Response`], a notification carries no
//! correlation id — nothing is waiting on it specifically.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Notification {
    pub fn progress(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: "progress".to_string(),
            params: serde_json::json!({"message": message.into()}),
            session_id: Some(session_id.into()),
        }
    }
}
