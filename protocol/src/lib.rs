//! Agent-MCP wire protocol (§6): request/response envelopes carrying a
//! correlation id, a method name, a params object, and an optional bound
//! session id; a structured error object; and notification frames used for
//! progress markers on the SSE stream.

mod envelope;
mod error;
mod notification;

pub use envelope::{Request, RequestId, Response};
pub use error::ErrorObject;
pub use notification::Notification;
