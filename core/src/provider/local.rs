//! The local / openai-compatible provider variant: any server speaking the
//! OpenAI HTTP surface at a caller-chosen base URL (e.g. an on-box model
//! runner). Reuses `async_openai`'s client pointed at a custom base url,
//! the same trick `OpenAIEmbedder::with_config` documents for non-default
//! endpoints.

use super::{ChatMessage, ChatRole, Provider};
use crate::error::{AppError, AppResult};
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::types::embeddings::{CreateEmbeddingRequest, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

pub struct LocalProvider {
    config: OpenAIConfig,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    native_dimension: usize,
    client: reqwest::Client,
}

impl LocalProvider {
    pub fn new(
        base_url: String,
        embedding_model: String,
        chat_model: String,
        native_dimension: usize,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key("local");
        Self {
            config,
            base_url,
            embedding_model,
            chat_model,
            native_dimension,
            client: reqwest::Client::new(),
        }
    }

    fn to_request_message(msg: &ChatMessage) -> AppResult<ChatCompletionRequestMessage> {
        Ok(match msg.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map_err(|e| AppError::Internal(e.to_string()))?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map_err(|e| AppError::Internal(e.to_string()))?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .build()
                .map_err(|e| AppError::Internal(e.to_string()))?
                .into(),
        })
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn native_dimension(&self) -> usize {
        self.native_dimension
    }

    /// A lightweight reachability probe rather than a real call, so the
    /// fallback chain can cheaply skip an offline local server.
    async fn available(&self) -> bool {
        let health_url = format!("{}/models", self.base_url.trim_end_matches('/'));
        self.client
            .get(health_url)
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn warm_up(&self) -> AppResult<()> {
        if self.available().await {
            Ok(())
        } else {
            Err(AppError::ProviderUnavailable(format!(
                "local provider at {} not reachable",
                self.base_url
            )))
        }
    }

    async fn embed(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let client = Client::with_config(self.config.clone());
        let inputs: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        let input = if inputs.len() == 1 {
            EmbeddingInput::String(inputs[0].clone())
        } else {
            EmbeddingInput::StringArray(inputs)
        };
        let request = CreateEmbeddingRequest {
            input,
            model: self.embedding_model.clone(),
            ..Default::default()
        };
        let response = client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> AppResult<String> {
        let client = Client::with_config(self.config.clone());
        let request_messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<AppResult<Vec<_>>>()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model.unwrap_or(&self.chat_model))
            .messages(request_messages)
            .build()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::ProviderUnavailable("empty chat response".into()))
    }
}
