//! Translates a wire [`protocol::Request`] into a call against the
//! orchestrator's tool registry / resource surface, and wraps whatever
//! comes back into a [`protocol::Response`]. This is the one place that
//! knows both the wire protocol and `core`'s internals; everything in
//! `app.rs` only knows HTTP.

use agent_core::auth::TokenInfo;
use agent_core::error::AppError;
use agent_core::orchestrator::Orchestrator;
use protocol::{ErrorObject, Request, RequestId, Response};
use serde_json::{json, Value};

/// `core::AppError::code()` values mapped to HTTP status, mirrored here
/// rather than in `core` since only a transport has an opinion about HTTP
/// status codes — the wire error object's `code` field is what travels.
pub fn http_status(code: &str) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match code {
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "not_found" => StatusCode::NOT_FOUND,
        "conflict" => StatusCode::CONFLICT,
        "bad_request" => StatusCode::BAD_REQUEST,
        "dependency_missing" => StatusCode::FAILED_DEPENDENCY,
        "provider_unavailable" => StatusCode::BAD_GATEWAY,
        "store_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "cancelled" => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(id: RequestId, err: AppError) -> Response {
    Response::err(id, ErrorObject::new(err.code(), err.to_string()))
}

/// Handles one `post-message` call already bound to a session (§4.10).
/// `session_id` is injected into the tool params so `session_state` tools
/// can address their own session without the wire protocol itself naming
/// one (see `core::tools::session_state`'s module doc).
pub async fn handle_request(
    orchestrator: &Orchestrator,
    caller: TokenInfo,
    session_id: &str,
    req: Request,
) -> Response {
    let id = req.id.clone();
    match req.method.as_str() {
        "tools/list" => {
            let tools: Vec<Value> = orchestrator
                .tools
                .list()
                .into_iter()
                .map(|(name, category, schema)| {
                    json!({"name": name, "category": category.as_str(), "schema": schema})
                })
                .collect();
            Response::ok(id, json!({"tools": tools}))
        }
        "tools/call" => {
            let Some(name) = req.params.get("name").and_then(Value::as_str) else {
                return error_response(
                    id,
                    AppError::BadRequest("tools/call requires a tool name".into()),
                );
            };
            let mut params = req
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            inject_session_id(&mut params, session_id);
            match orchestrator.tools.call(name, caller, params).await {
                Ok(result) => Response::ok(id, result),
                Err(e) => error_response(id, e),
            }
        }
        "resources/list" => match orchestrator.resources.list(&caller).await {
            Ok(resources) => Response::ok(id, json!({"resources": resources})),
            Err(e) => error_response(id, e),
        },
        "resources/read" => {
            let Some(uri) = req.params.get("uri").and_then(Value::as_str) else {
                return error_response(
                    id,
                    AppError::BadRequest("resources/read requires a uri".into()),
                );
            };
            match orchestrator.resources.resolve(&caller, uri).await {
                Ok(Some(resource)) => Response::ok(id, json!(resource)),
                Ok(None) => error_response(id, AppError::NotFound(format!("resource {uri}"))),
                Err(e) => error_response(id, e),
            }
        }
        other => error_response(id, AppError::NotFound(format!("method {other}"))),
    }
}

fn inject_session_id(params: &mut Value, session_id: &str) {
    if let Value::Object(map) = params {
        map.insert("_session_id".to_string(), json!(session_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_session_id_into_object_params() {
        let mut params = json!({"key": "a"});
        inject_session_id(&mut params, "sess-1");
        assert_eq!(params["_session_id"], json!("sess-1"));
        assert_eq!(params["key"], json!("a"));
    }

    #[test]
    fn status_mapping_covers_every_known_code() {
        assert_eq!(http_status("unauthorized"), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(http_status("not_found"), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(http_status("made_up"), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
