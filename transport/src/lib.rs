//! Streamable HTTP transport for the Agent-MCP server (§4.10).
//!
//! Primary endpoint `POST /mcp` (create-stream via `initialize`, then
//! post-message for everything else) plus `DELETE /mcp` for an explicit
//! close, a legacy `GET /sse` + `POST /messages` fallback for clients that
//! want a long-lived event stream, and the auxiliary `/health`, `/stats`,
//! `/sessions`, `/config` endpoints. Generalizes the teacher's axum
//! `Router`/`AppState`/WebSocket-upgrade shape (`app.rs`) to this request
//! surface; wire dispatch lives in [`dispatch`], session lifecycle in
//! [`session`].

mod app;
mod dispatch;
mod session;

pub use app::{router, AppState};
pub use session::{SessionManager, SessionRecord, SessionStatus};

use agent_core::orchestrator::Orchestrator;
use config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Binds a listener on `settings.port`, starts the session sweeper, and
/// serves until `cancel` fires. The sweeper is cancelled alongside the
/// server so a shutdown signal stops every background task in lockstep
/// (§4.11's "all background tasks honor a single shared cancellation
/// signal").
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "transport listening");
    serve_on_listener(orchestrator, settings, listener, cancel).await
}

/// Serves on an already-bound listener instead of `settings.port`. Used by
/// tests, which bind `127.0.0.1:0` to get an OS-assigned port rather than
/// racing a fixed one.
pub async fn serve_on_listener(
    orchestrator: Arc<Orchestrator>,
    settings: &Settings,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let sessions = Arc::new(SessionManager::new(
        orchestrator.store.clone(),
        Duration::from_secs(settings.transport.grace_period_minutes * 60),
    ));
    let sweeper = session::spawn_sweeper(
        sessions.clone(),
        Duration::from_secs(settings.transport.sweep_interval_seconds),
        cancel.clone(),
    );

    let state = Arc::new(AppState {
        orchestrator,
        sessions,
    });
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await?;

    sweeper.abort();
    Ok(())
}
