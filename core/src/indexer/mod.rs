//! Background knowledge indexer: periodically walks the project tree and
//! the live task/context tables, chunks changed sources, and embeds them
//! into the vector store for the retriever (§4.5).

mod chunker;
mod cycle;

pub use chunker::{chunk_text, ChunkParams};
pub use cycle::{IndexCycleStats, Indexer, SourceType};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns the periodic background cycle. The first run fires after
/// `warmup_delay` (letting the rest of boot settle before the first scan),
/// then every `interval` thereafter. Exits promptly when `cancel` fires.
pub fn spawn_loop(
    indexer: Arc<Indexer>,
    interval: Duration,
    warmup_delay: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(warmup_delay) => {}
            _ = cancel.cancelled() => return,
        }

        loop {
            match indexer.run_cycle(&cancel).await {
                Ok(stats) if stats.coalesced => {
                    tracing::debug!("indexing cycle coalesced; one already in flight");
                }
                Ok(stats) => {
                    tracing::info!(
                        scanned = stats.scanned,
                        changed = stats.changed,
                        chunks_inserted = stats.chunks_inserted,
                        "indexing cycle complete"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "indexing cycle failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return,
            }
        }
    })
}
