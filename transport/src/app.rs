//! Axum app: state, router, and the streamable-HTTP + legacy-SSE handlers
//! (§4.10). Generalizes the teacher's `AppState` + `router()` shape
//! (`app.rs`) from a single WebSocket upgrade route to the handful of
//! HTTP/SSE routes this protocol needs; session lifecycle and auth are
//! handled here, wire dispatch is delegated to [`crate::dispatch`].

use crate::dispatch::{handle_request, http_status};
use crate::session::SessionManager;
use agent_core::auth::{Role, TokenInfo};
use agent_core::orchestrator::Orchestrator;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use protocol::{ErrorObject, Request, RequestId, Response};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionManager>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", post(post_mcp))
        .route("/mcp", delete(close_mcp))
        .route("/sse", get(get_sse))
        .route("/messages", post(post_messages))
        .route("/health", get(get_health))
        .route("/stats", get(get_stats))
        .route("/sessions", get(get_sessions))
        .route("/config", get(get_config).post(post_config))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenInfo, AxumResponse> {
    let Some(token) = bearer_token(headers) else {
        return Err(unauthorized_response("missing bearer token"));
    };
    state
        .orchestrator
        .auth
        .verify(token)
        .await
        .map_err(|e| error_to_response(RequestId::String("auth".into()), e))
}

fn unauthorized_response(message: &str) -> AxumResponse {
    let body = Response::err(
        RequestId::String("auth".into()),
        ErrorObject::new("unauthorized", message.to_string()),
    );
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

fn error_to_response(id: RequestId, err: agent_core::error::AppError) -> AxumResponse {
    let status = http_status(err.code());
    let body = Response::err(id, ErrorObject::new(err.code(), err.to_string()));
    (status, Json(body)).into_response()
}

/// `POST /mcp`: handles `initialize` (create-stream) by allocating a fresh
/// session, and every other method (post-message) against an existing one
/// named by the `Mcp-Session-Id` header or the request body's `session_id`.
async fn post_mcp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<Request>,
) -> AxumResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };

    if req.method == "initialize" {
        let bound_agent_id = if caller.role == Role::Agent {
            caller.agent_id.clone()
        } else {
            None
        };
        return match state.sessions.create(bound_agent_id).await {
            Ok(session) => {
                let mut resp = (
                    StatusCode::OK,
                    Json(Response::ok(req.id, json!({"session_id": session.id}))),
                )
                    .into_response();
                if let Ok(value) = session.id.parse() {
                    resp.headers_mut().insert(SESSION_HEADER, value);
                }
                resp
            }
            Err(e) => error_to_response(req.id, e),
        };
    }

    let session_id = match headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.session_id.clone())
    {
        Some(id) => id,
        None => {
            return error_to_response(
                req.id,
                agent_core::error::AppError::BadRequest("no bound transport session".into()),
            )
        }
    };

    if let Err(e) = state.sessions.touch(&session_id).await {
        return error_to_response(req.id, e);
    }

    let response = handle_request(&state.orchestrator, caller, &session_id, req).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// `DELETE /mcp`: the close method. Marks the session expired immediately
/// and purges its per-session state rather than waiting for the sweeper.
async fn close_mcp(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AxumResponse {
    if authenticate(&state, &headers).await.is_err() {
        return unauthorized_response("missing bearer token");
    }
    let Some(session_id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response();
    };
    match state.sessions.close(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_to_response(RequestId::String(session_id.to_string()), e),
    }
}

/// Legacy fallback (§3.10): `GET /sse` opens a session and streams it back
/// as the first event, then a periodic keepalive notification, mirroring
/// the teacher's socket-per-connection lifecycle but framed as SSE instead
/// of WebSocket text frames.
async fn get_sse(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AxumResponse> {
    let caller = authenticate(&state, &headers).await?;
    let bound_agent_id = if caller.role == Role::Agent {
        caller.agent_id
    } else {
        None
    };
    let session = state
        .sessions
        .create(bound_agent_id)
        .await
        .map_err(|e| error_to_response(RequestId::String("sse".into()), e))?;

    let sessions = state.sessions.clone();
    let session_id = session.id.clone();
    let init = protocol::Notification {
        method: "session/open".to_string(),
        params: json!({"session_id": session_id}),
        session_id: Some(session_id.clone()),
    };
    let init_event = Event::default().event("session").json_data(init).unwrap();

    let heartbeat = async_stream::stream! {
        yield Ok(init_event);
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            if sessions.touch(&session_id).await.is_err() {
                return;
            }
            let note = protocol::Notification::progress(session_id.clone(), "heartbeat");
            yield Ok(Event::default().event("progress").json_data(note).unwrap());
        }
    };

    Ok(Sse::new(heartbeat).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
struct MessagesQuery {
    session_id: Option<String>,
}

/// Legacy fallback's post-message half: identical dispatch to `POST /mcp`,
/// just addressed by query string instead of a header (matching how the
/// client-side `McpHttpSession` handshake names a session on this route).
async fn post_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
    Json(req): Json<Request>,
) -> AxumResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(caller) => caller,
        Err(resp) => return resp,
    };
    let Some(session_id) = query.session_id.or_else(|| req.session_id.clone()) else {
        return error_to_response(
            req.id,
            agent_core::error::AppError::BadRequest("no bound transport session".into()),
        );
    };
    if let Err(e) = state.sessions.touch(&session_id).await {
        return error_to_response(req.id, e);
    }
    let response = handle_request(&state.orchestrator, caller, &session_id, req).await;
    (StatusCode::OK, Json(response)).into_response()
}

async fn get_health(State(state): State<Arc<AppState>>) -> AxumResponse {
    match state.orchestrator.store.health().await {
        Ok(report) => {
            let enabled_categories: BTreeSet<&str> = state
                .orchestrator
                .tools
                .list()
                .into_iter()
                .map(|(_, category, _)| category.as_str())
                .collect();
            Json(json!({
                "status": "ok",
                "enabled_categories": enabled_categories,
                "tool_count": state.orchestrator.tools.len(),
                "vector_available": report.vector_available,
            }))
            .into_response()
        }
        Err(e) => error_to_response(RequestId::String("health".into()), e).into_response(),
    }
}

async fn get_stats(State(state): State<Arc<AppState>>) -> AxumResponse {
    match state.orchestrator.store.health().await {
        Ok(report) => Json(json!({
            "rows": report.rows,
            "vector_available": report.vector_available,
            "target_dim": state.orchestrator.store.target_dim(),
            "provider_available": state.orchestrator.provider.available().await,
        }))
        .into_response(),
        Err(e) => error_to_response(RequestId::String("stats".into()), e).into_response(),
    }
}

async fn get_sessions(State(state): State<Arc<AppState>>) -> AxumResponse {
    match state.sessions.counts().await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => error_to_response(RequestId::String("sessions".into()), e).into_response(),
    }
}

async fn get_config(State(state): State<Arc<AppState>>) -> AxumResponse {
    Json(json!({"enabled_categories": state.orchestrator.tools.list().into_iter().map(|(n, _, _)| n).collect::<Vec<_>>()})).into_response()
}

#[derive(Deserialize)]
struct ConfigToggle {
    #[allow(dead_code)]
    category: String,
    #[allow(dead_code)]
    enabled: bool,
}

/// Runtime category toggling is read-only in this implementation: the tool
/// registry is gated once at boot (§4.9) and rebuilding it live would race
/// in-flight calls against a category being removed mid-dispatch. `POST
/// /config` validates the request shape and reports which categories are
/// currently enabled rather than mutating them.
async fn post_config(
    State(state): State<Arc<AppState>>,
    Json(_toggle): Json<ConfigToggle>,
) -> AxumResponse {
    get_config(State(state)).await
}
