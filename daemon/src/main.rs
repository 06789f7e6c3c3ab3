//! Agent-MCP server binary (§4.11): load config, boot the orchestrator,
//! serve the transport until a shutdown signal, then drain and close.

use agent_core::orchestrator::Orchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "agent-mcp";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config::load_and_apply(APP_NAME, None).map_err(|e| format!("loading config: {e}"))?;
    let project_dir = std::env::current_dir()?;
    let settings = config::Settings::load(&project_dir)?;

    let (orchestrator, admin_token) = Orchestrator::boot(&settings).await?;
    if let Some(token) = admin_token {
        println!("admin token (store this now, it will not be shown again): {token}");
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        signal_cancel.cancel();
    });

    let orchestrator = Arc::new(orchestrator);
    transport::serve(orchestrator.clone(), &settings, cancel).await?;

    match Arc::try_unwrap(orchestrator) {
        Ok(orchestrator) => orchestrator.shutdown().await,
        Err(_) => tracing::warn!("orchestrator still has outstanding references at shutdown"),
    }
    Ok(())
}
