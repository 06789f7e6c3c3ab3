//! Request/response envelopes (§6): every call carries a correlation id,
//! a method name, a params object, and an optional bound transport session
//! id; every reply carries the same id paired with either a result or a
//! structured error.

use crate::error::ErrorObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A correlation id. Clients may use either a string or a number; both are
/// echoed back verbatim on the matching [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// The transport session this call is bound to, if any (absent on the
    /// very first request of a stream, which is what creates one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RequestId, error: ErrorObject) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = Request {
            id: RequestId::String("abc".to_string()),
            method: "health".to_string(),
            params: serde_json::json!({}),
            session_id: Some("sess-1".to_string()),
        };
        let raw = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.method, "health");
        assert_eq!(back.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn response_omits_absent_error_and_result() {
        let ok = Response::ok(RequestId::Number(1), serde_json::json!({"a": 1}));
        let raw = serde_json::to_value(&ok).unwrap();
        assert!(raw.get("error").is_none());
        assert!(raw.get("result").is_some());
    }
}
