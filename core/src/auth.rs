//! Token issuance and verification. Exactly one persisted admin token;
//! one token per agent. Tokens are opaque 128-bit random values, hex
//! encoded. Never logged, never read from or written to an environment
//! variable.

use crate::error::{AppError, AppResult};
use crate::store::Store;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const ADMIN_TOKEN_KEY: &str = "admin_token";
const MIN_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Admin,
    Agent,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub role: Role,
    pub agent_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    Invalid,
}

pub struct Auth {
    store: Arc<Store>,
}

impl Auth {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Generates a fresh 128-bit token, hex encoded. Built from two v4
    /// UUIDs rather than a new `rand` dependency, since the rest of this
    /// crate already depends on `uuid` for identifiers.
    fn generate_token() -> String {
        format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        )
    }

    /// Mints a fresh per-agent token. Public so the supervisor can issue one
    /// at agent-creation time without reaching into this module's internals.
    pub fn issue_agent_token() -> String {
        Self::generate_token()
    }

    /// Idempotently ensures a persisted admin token exists, minting one on
    /// first boot. Returns the token only on first mint so the caller can
    /// surface it to an operator exactly once; subsequent boots return
    /// `None` (the value is never re-logged).
    pub async fn ensure_admin_token(&self) -> AppResult<Option<String>> {
        let existing = self
            .store
            .read(|conn| {
                conn.query_row(
                    "SELECT value FROM server_meta WHERE key = ?1",
                    [ADMIN_TOKEN_KEY],
                    |row| row.get::<_, String>(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        AppError::NotFound("admin token".into())
                    }
                    e => AppError::from(e),
                })
            })
            .await;

        match existing {
            Ok(_) => Ok(None),
            Err(AppError::NotFound(_)) => {
                let token = Self::generate_token();
                let to_store = token.clone();
                self.store
                    .write(move |tx| {
                        tx.execute(
                            "INSERT INTO server_meta (key, value) VALUES (?1, ?2)",
                            rusqlite::params![ADMIN_TOKEN_KEY, to_store],
                        )
                        .map_err(AppError::from)?;
                        Ok(())
                    })
                    .await?;
                Ok(Some(token))
            }
            Err(e) => Err(e),
        }
    }

    /// A short or obviously-malformed token is rejected before it ever
    /// reaches a store lookup.
    fn well_formed(token: &str) -> bool {
        token.len() >= MIN_TOKEN_LEN && token.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub async fn verify(&self, token: &str) -> AppResult<TokenInfo> {
        if !Self::well_formed(token) {
            return Err(AppError::Unauthorized("malformed token".into()));
        }

        let admin_token = self
            .store
            .read(|conn| {
                conn.query_row(
                    "SELECT value FROM server_meta WHERE key = ?1",
                    [ADMIN_TOKEN_KEY],
                    |row| row.get::<_, String>(0),
                )
                .map_err(AppError::from)
            })
            .await
            .ok();

        if admin_token.as_deref() == Some(token) {
            return Ok(TokenInfo {
                role: Role::Admin,
                agent_id: None,
            });
        }

        let agent_id = token.to_string();
        let found = self
            .store
            .read(move |conn| {
                conn.query_row(
                    "SELECT id FROM agents WHERE token = ?1",
                    [agent_id.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        AppError::Unauthorized("unknown token".into())
                    }
                    e => AppError::from(e),
                })
            })
            .await?;

        Ok(TokenInfo {
            role: Role::Agent,
            agent_id: Some(found),
        })
    }

    /// Masked fingerprint safe for resource descriptions and logs.
    pub fn fingerprint(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        hex_prefix(&digest, 8)
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mints_admin_token_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let auth = Auth::new(store);
        let first = auth.ensure_admin_token().await.unwrap();
        assert!(first.is_some());
        let second = auth.ensure_admin_token().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn verify_resolves_admin_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let auth = Auth::new(store);
        let token = auth.ensure_admin_token().await.unwrap().unwrap();
        let info = auth.verify(&token).await.unwrap();
        assert_eq!(info.role, Role::Admin);
    }

    #[tokio::test]
    async fn verify_rejects_short_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("state.db"), 8).unwrap());
        let auth = Auth::new(store);
        let err = auth.verify("short").await.unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = Auth::fingerprint("abc123");
        let b = Auth::fingerprint("abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
