//! Wire-stable error kinds shared by every component.
//!
//! The `code()` string is what crosses the wire inside a response's
//! `{code, message, details?}` error object; it must never change shape
//! once a client depends on it.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::DependencyMissing(_) => "dependency_missing",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Cancelled => "cancelled",
            AppError::Internal(_) => "internal",
        }
    }

    /// `internal` errors are the one kind the spec requires an action-log
    /// entry for on every occurrence; this flags that for callers that log.
    pub fn requires_action_log(&self) -> bool {
        matches!(self, AppError::Internal(_))
    }

    pub fn details(&self) -> Option<Value> {
        None
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            AppError::Cancelled
        } else {
            AppError::Internal(e.to_string())
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::ProviderUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_wire_stable() {
        assert_eq!(AppError::Unauthorized("x".into()).code(), "unauthorized");
        assert_eq!(AppError::Conflict("x".into()).code(), "conflict");
        assert_eq!(AppError::Cancelled.code(), "cancelled");
        assert!(AppError::Internal("x".into()).requires_action_log());
        assert!(!AppError::NotFound("x".into()).requires_action_log());
    }
}
