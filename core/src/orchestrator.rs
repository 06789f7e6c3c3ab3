//! Boot sequence (§4.11): open the store, mint the admin token if this is a
//! first run, wire every service off the one `Store`, build the gated tool
//! registry, start the background indexer, and hand the assembled
//! [`Orchestrator`] to whichever transport drives it. Graceful shutdown
//! cancels the indexer loop and waits for it to exit.

use crate::action_log::ActionLog;
use crate::agents::Supervisor;
use crate::auth::Auth;
use crate::context::ProjectContext;
use crate::error::AppResult;
use crate::indexer::{spawn_loop, Indexer};
use crate::mux::Multiplexer;
use crate::provider::{CloudProvider, LocalProvider, Provider, ProviderChain};
use crate::registry::ToolRegistry;
use crate::resources::ResourceSurface;
use crate::retriever::Retriever;
use crate::store::Store;
use crate::tasks::{TaskGraph, TaskSearch};
use crate::tools::{self, ToolContext};
use config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delay before the indexer's first cycle, letting the rest of boot settle.
const INDEXER_WARMUP_DELAY: Duration = Duration::from_secs(5);

/// Everything a transport needs to serve requests: the tool registry, the
/// resource surface, auth, and the services a transport-level session
/// manager doesn't own directly but may need for diagnostics (`store`).
pub struct Orchestrator {
    pub store: Arc<Store>,
    pub auth: Arc<Auth>,
    pub tasks: Arc<TaskGraph>,
    pub search: Arc<TaskSearch>,
    pub supervisor: Arc<Supervisor>,
    pub context: Arc<ProjectContext>,
    pub retriever: Arc<Retriever>,
    pub action_log: Arc<ActionLog>,
    pub tools: Arc<ToolRegistry>,
    pub resources: Arc<ResourceSurface>,
    pub provider: Arc<ProviderChain>,
    indexer_handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Runs the full boot sequence from a loaded [`Settings`]. Returns the
    /// first-mint admin token as `Some` only on a brand-new store (§4.2) so
    /// the caller can print it to the operator exactly once.
    pub async fn boot(settings: &Settings) -> AppResult<(Self, Option<String>)> {
        let store = Arc::new(Store::open(
            settings.state_db_path(),
            settings.embedding.target_dim,
        )?);

        Self::check_phase_consistency(&store).await?;

        let auth = Arc::new(Auth::new(store.clone()));
        let admin_token = auth.ensure_admin_token().await?;

        let mux = Arc::new(Multiplexer::default());
        if !mux.probe().await {
            tracing::warn!("continuing without a local terminal multiplexer");
        }

        let provider = Arc::new(build_provider_chain(settings));
        if !provider.available().await {
            tracing::warn!("no embedding/chat provider is reachable; retrieval will degrade to keyword-only");
        }

        let tasks = Arc::new(TaskGraph::new(store.clone()));
        let search = Arc::new(TaskSearch::new(store.clone()));
        let endpoint = format!("127.0.0.1:{}", settings.port);
        let supervisor = Arc::new(Supervisor::new(store.clone(), mux.clone(), endpoint));
        let context = Arc::new(ProjectContext::new(store.clone()));
        let retriever = Arc::new(Retriever::new(store.clone(), provider.clone()));
        let action_log = Arc::new(ActionLog::new(store.clone()));

        let tool_ctx = ToolContext {
            store: store.clone(),
            tasks: tasks.clone(),
            search: search.clone(),
            supervisor: supervisor.clone(),
            context: context.clone(),
            retriever: retriever.clone(),
            action_log: action_log.clone(),
        };
        let registry = Arc::new(tools::build_registry(
            tool_ctx,
            &settings.tools.enabled_categories,
        )?);
        let resources = Arc::new(ResourceSurface::new(
            supervisor.clone(),
            tasks.clone(),
            mux.clone(),
        ));

        let cancel = CancellationToken::new();
        let indexer_handle = if settings.indexing.enabled {
            let indexer = Arc::new(Indexer::new(
                store.clone(),
                provider.clone(),
                settings.project_dir.clone(),
            ));
            spawn_loop(
                indexer,
                Duration::from_secs(settings.indexing.interval_seconds),
                INDEXER_WARMUP_DELAY,
                cancel.clone(),
            )
        } else {
            tokio::spawn(async {})
        };

        Ok((
            Self {
                store,
                auth,
                tasks,
                search,
                supervisor,
                context,
                retriever,
                action_log,
                tools: registry,
                resources,
                provider,
                indexer_handle,
                cancel,
            },
            admin_token,
        ))
    }

    /// I-T4 says at most one phase is active at a time; `create_self_task`
    /// enforces this going forward, but historical data (manual store
    /// edits, a restored backup) can already violate it. Per the Open
    /// Question decision recorded in DESIGN.md, this implementation refuses
    /// to boot rather than silently pick a winner, naming every conflicting
    /// root so an admin can resolve it with `delete_task`/
    /// `update_task_status`.
    async fn check_phase_consistency(store: &Arc<Store>) -> AppResult<()> {
        let roots = store
            .read(|conn| crate::tasks::active_phase_roots(conn))
            .await?;
        if roots.len() > 1 {
            return Err(crate::error::AppError::StoreUnavailable(format!(
                "{} root tasks have an active phase simultaneously ({}); \
                 an admin must resolve this with delete_task/update_task_status before the server will start",
                roots.len(),
                roots.join(", ")
            )));
        }
        Ok(())
    }

    /// Cancels the indexer loop and waits for it to exit. Idempotent only in
    /// the sense that a second call joins an already-finished handle; the
    /// daemon calls this once, on signal.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.indexer_handle.await;
    }
}

fn build_provider_chain(settings: &Settings) -> ProviderChain {
    let mut names = vec![settings.embedding.provider.clone()];
    names.extend(settings.embedding.fallback.clone());

    let providers: Vec<Arc<dyn Provider>> = names
        .into_iter()
        .filter_map(|name| build_provider(&name, settings))
        .collect();

    ProviderChain::new(providers, settings.embedding.target_dim)
}

fn build_provider(name: &str, settings: &Settings) -> Option<Arc<dyn Provider>> {
    match name {
        "cloud" => Some(Arc::new(CloudProvider::new(
            std::env::var("OPENAI_API_KEY").ok(),
            "text-embedding-3-small".to_string(),
            "gpt-4o-mini".to_string(),
        ))),
        "local" => {
            let base_url = settings
                .embedding
                .local_base_url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:11434/v1".to_string());
            Some(Arc::new(LocalProvider::new(
                base_url,
                "nomic-embed-text".to_string(),
                "llama3".to_string(),
                settings.embedding.target_dim,
            )))
        }
        _ => {
            tracing::warn!(provider = name, "unknown embedding provider name, skipping");
            None
        }
    }
}
