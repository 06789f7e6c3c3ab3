//! The cloud provider variant: OpenAI's hosted chat + embedding endpoints,
//! grounded directly on `OpenAIEmbedder`'s client construction.

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

pub struct CloudProvider {
    config: OpenAIConfig,
    embedding_model: String,
    chat_model: String,
    native_dimension: usize,
    has_key: bool,
}

impl CloudProvider {
    pub fn new(api_key: Option<String>, embedding_model: String, chat_model: String) -> Self {
        let has_key = api_key.is_some() || std::env::var("OPENAI_API_KEY").is_ok();
        let mut config = OpenAIConfig::new();
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        let native_dimension = dimension_for_model(&embedding_model);
        Self {
            config,
            embedding_model,
            chat_model,
            native_dimension,
            has_key,
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

fn dimension_for_model(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

#[async_trait]
impl Provider for CloudProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    fn native_dimension(&self) -> usize {
        self.native_dimension
    }

    async fn available(&self) -> bool {
        self.has_key
    }

    async fn warm_up(&self) -> AppResult<()> {
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_lookup_matches_known_models() {
        assert_eq!(dimension_for_model("text-embedding-3-large"), 3072);
        assert_eq!(dimension_for_model("text-embedding-3-small"), 1536);
        assert_eq!(dimension_for_model("unknown-model"), 1536);
    }
}
