//! The wire-stable error object (§7): `{code, message, details?}`. `code`
//! mirrors [`core`'s `AppError::code()`](../core/error.rs) one-to-one —
//! this crate has no dependency on `core` so the mapping is maintained by
//! convention (transport constructs one from the other) rather than a
//! shared enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
