//! Pluggable embedding + chat provider with dimension normalization and a
//! fallback chain. Polymorphic over {cloud, local} exactly as spec §4.4/§9
//! describe: a small trait, new variants added by implementing it and
//! registering a factory keyed by provider name.

mod cloud;
mod local;
mod normalize;

pub use cloud::CloudProvider;
pub use local::LocalProvider;
pub use normalize::normalize_dimension;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// The interface every embedding/chat backend implements. Kept deliberately
/// small: `available`/`warm_up` let the fallback chain and the orchestrator
/// boot sequence probe without making a real call; `embed`/`chat` do the
/// work.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Native embedding width this provider produces, before normalization.
    fn native_dimension(&self) -> usize;

    async fn available(&self) -> bool;

    async fn warm_up(&self) -> AppResult<()>;

    async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>>;

    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> AppResult<String>;
}

/// Tries providers in order: the first whose `available()` returns true is
/// used; on a transient error at call time the next is tried, through to
/// the end of the list. Every result is normalized to `target_dim`.
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
    target_dim: usize,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>, target_dim: usize) -> Self {
        Self {
            providers,
            target_dim,
        }
    }

    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    async fn first_available(&self) -> AppResult<&Arc<dyn Provider>> {
        for p in &self.providers {
            if p.available().await {
                return Ok(p);
            }
        }
        Err(crate::error::AppError::ProviderUnavailable(
            "no configured provider is available".into(),
        ))
    }

    pub async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let mut last_err = None;
        for p in &self.providers {
            if !p.available().await {
                continue;
            }
            match p.embed(texts).await {
                Ok(vectors) => {
                    return Ok(vectors
                        .into_iter()
                        .map(|v| normalize_dimension(v, self.target_dim))
                        .collect());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            crate::error::AppError::ProviderUnavailable("no provider available".into())
        }))
    }

    pub async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> AppResult<String> {
        let mut last_err = None;
        for p in &self.providers {
            if !p.available().await {
                continue;
            }
            match p.chat(messages, model).await {
                Ok(text) => return Ok(text),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            crate::error::AppError::ProviderUnavailable("no provider available".into())
        }))
    }

    pub async fn available(&self) -> bool {
        self.first_available().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyProvider {
        name: &'static str,
        always_fails: AtomicBool,
        dim: usize,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn native_dimension(&self) -> usize {
            self.dim
        }
        async fn available(&self) -> bool {
            true
        }
        async fn warm_up(&self) -> AppResult<()> {
            Ok(())
        }
        async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
            if self.always_fails.load(Ordering::SeqCst) {
                Err(crate::error::AppError::ProviderUnavailable("flaky".into()))
            } else {
                Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
            }
        }
        async fn chat(&self, _messages: &[ChatMessage], _model: Option<&str>) -> AppResult<String> {
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_provider_on_error() {
        let primary = Arc::new(FlakyProvider {
            name: "primary",
            always_fails: AtomicBool::new(true),
            dim: 4,
        });
        let secondary = Arc::new(FlakyProvider {
            name: "secondary",
            always_fails: AtomicBool::new(false),
            dim: 4,
        });
        let chain = ProviderChain::new(vec![primary, secondary], 8);
        let result = chain.embed(&["hello"]).await.unwrap();
        assert_eq!(result[0].len(), 8);
    }
}
