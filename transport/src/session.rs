//! Transport session lifecycle (spec §4.10): allocate on initialize, slide
//! the heartbeat/expiry forward on every request, and let a background
//! sweeper transition `live → idle → expired` and purge expired rows along
//! with their per-session state. Sessions and session state both live in
//! `core`'s store (`transport_sessions` / `session_state` tables) so a
//! restart doesn't lose a reconnect window.

use agent_core::error::{AppError, AppResult};
use agent_core::store::Store;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Live,
    Idle,
    Expired,
}

impl SessionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Live => "live",
            SessionStatus::Idle => "idle",
            SessionStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "idle" => SessionStatus::Idle,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Live,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub bound_agent_id: Option<String>,
    pub created_at: i64,
    pub last_heartbeat: i64,
    pub expires_at: i64,
    pub status: SessionStatus,
}

/// Snapshot counts for the `/sessions` auxiliary endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionCounts {
    pub live: usize,
    pub idle: usize,
    pub expired: usize,
}

pub struct SessionManager {
    store: Arc<Store>,
    grace_period: Duration,
    idle_after: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<Store>, grace_period: Duration) -> Self {
        // A session goes idle after a quarter of its grace period passes
        // with no request, well before it is swept as expired.
        let idle_after = grace_period / 4;
        Self {
            store,
            grace_period,
            idle_after,
        }
    }

    /// Allocates a fresh session bound to `bound_agent_id` (`None` for the
    /// admin role, which has no per-agent identity to bind).
    pub async fn create(&self, bound_agent_id: Option<String>) -> AppResult<SessionRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now_ms();
        let expires_at = created_at + self.grace_period.as_millis() as i64;
        let record = SessionRecord {
            id: id.clone(),
            bound_agent_id: bound_agent_id.clone(),
            created_at,
            last_heartbeat: created_at,
            expires_at,
            status: SessionStatus::Live,
        };
        self.store
            .write(move |tx| {
                tx.execute(
                    "INSERT INTO transport_sessions (id, bound_agent_id, created_at, last_heartbeat, expires_at, status) VALUES (?1, ?2, ?3, ?4, ?5, 'live')",
                    rusqlite::params![id, bound_agent_id, created_at, created_at, expires_at],
                )
                .map_err(AppError::from)?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Re-derives a session's current record, healing its status against
    /// wall-clock time even between sweeper runs (a request arriving just
    /// past `expires_at` must not be served as if still live).
    pub async fn touch(&self, id: &str) -> AppResult<SessionRecord> {
        let row = self.fetch(id).await?;
        if matches!(row.status, SessionStatus::Expired) || now_ms() > row.expires_at {
            return Err(AppError::NotFound(format!("transport session {id}")));
        }

        let id = id.to_string();
        let heartbeat = now_ms();
        let expires_at = heartbeat + self.grace_period.as_millis() as i64;
        self.store
            .write(move |tx| {
                tx.execute(
                    "UPDATE transport_sessions SET last_heartbeat = ?1, expires_at = ?2, status = 'live' WHERE id = ?3",
                    rusqlite::params![heartbeat, expires_at, id],
                )
                .map_err(AppError::from)?;
                Ok(())
            })
            .await?;

        Ok(SessionRecord {
            last_heartbeat: heartbeat,
            expires_at,
            status: SessionStatus::Live,
            ..row
        })
    }

    pub async fn fetch(&self, id: &str) -> AppResult<SessionRecord> {
        let id = id.to_string();
        self.store
            .read(move |conn| {
                conn.query_row(
                    "SELECT id, bound_agent_id, created_at, last_heartbeat, expires_at, status FROM transport_sessions WHERE id = ?1",
                    [id.as_str()],
                    |row| {
                        Ok(SessionRecord {
                            id: row.get(0)?,
                            bound_agent_id: row.get(1)?,
                            created_at: row.get(2)?,
                            last_heartbeat: row.get(3)?,
                            expires_at: row.get(4)?,
                            status: SessionStatus::parse(&row.get::<_, String>(5)?),
                        })
                    },
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        AppError::NotFound(format!("transport session {id}"))
                    }
                    e => AppError::from(e),
                })
            })
            .await
    }

    /// Marks `id` expired immediately and purges its per-session state, in
    /// response to an explicit close rather than a sweep.
    pub async fn close(&self, id: &str) -> AppResult<()> {
        let id = id.to_string();
        self.store
            .write(move |tx| {
                tx.execute(
                    "UPDATE transport_sessions SET status = 'expired' WHERE id = ?1",
                    [id.as_str()],
                )
                .map_err(AppError::from)?;
                tx.execute(
                    "DELETE FROM session_state WHERE session_id = ?1",
                    [id.as_str()],
                )
                .map_err(AppError::from)?;
                Ok(())
            })
            .await
    }

    pub async fn counts(&self) -> AppResult<SessionCounts> {
        self.store
            .read(|conn| {
                let mut counts = SessionCounts::default();
                let mut stmt = conn
                    .prepare("SELECT status, COUNT(*) FROM transport_sessions GROUP BY status")
                    .map_err(AppError::from)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                    })
                    .map_err(AppError::from)?;
                for row in rows {
                    let (status, n) = row.map_err(AppError::from)?;
                    match status.as_str() {
                        "live" => counts.live = n,
                        "idle" => counts.idle = n,
                        _ => counts.expired = n,
                    }
                }
                Ok(counts)
            })
            .await
    }

    /// One sweep pass (§4.10): idle sessions whose heartbeat is stale but
    /// not yet past `expires_at`, then expired sessions past `expires_at`
    /// whose rows (and per-session state) are purged outright.
    async fn sweep_once(&self) -> AppResult<()> {
        let now = now_ms();
        let idle_cutoff = now - self.idle_after.as_millis() as i64;
        self.store
            .write(move |tx| {
                tx.execute(
                    "UPDATE transport_sessions SET status = 'idle' WHERE status = 'live' AND last_heartbeat < ?1 AND expires_at >= ?2",
                    rusqlite::params![idle_cutoff, now],
                )
                .map_err(AppError::from)?;
                let expired: Vec<String> = {
                    let mut stmt = tx
                        .prepare("SELECT id FROM transport_sessions WHERE expires_at < ?1")
                        .map_err(AppError::from)?;
                    let rows = stmt
                        .query_map([now], |row| row.get::<_, String>(0))
                        .map_err(AppError::from)?;
                    rows.collect::<Result<_, _>>().map_err(AppError::from)?
                };
                for id in &expired {
                    tx.execute("DELETE FROM session_state WHERE session_id = ?1", [id])
                        .map_err(AppError::from)?;
                    tx.execute("DELETE FROM transport_sessions WHERE id = ?1", [id])
                        .map_err(AppError::from)?;
                }
                Ok(())
            })
            .await
    }
}

/// Spawns the 60 s sweeper (default `sweep_interval_seconds`). Exits
/// promptly when `cancel` fires, mirroring `core::indexer::spawn_loop`.
pub fn spawn_sweeper(
    sessions: Arc<SessionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return,
            }
            if let Err(e) = sessions.sweep_once().await {
                tracing::warn!(error = %e, "session sweep failed");
            }
        }
    })
}
