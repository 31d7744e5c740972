use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;

/// Failures from the chat-completion provider. Rate limiting is the one
/// class the retry policy may act on.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider rate-limited the request")]
    RateLimited,

    #[error("failed to reach chat provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// The single external collaborator: one ordered message list in, one
/// assistant message out.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// OpenAI-compatible chat-completion client.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Image-mode turns go to the vision model when one is configured.
    fn model_for(&self, messages: &[ChatMessage]) -> &str {
        let multimodal = messages.iter().any(|m| m.is_multimodal());
        if multimodal {
            if let Some(vision_model) = self.config.vision_model.as_deref() {
                return vision_model;
            }
        }
        &self.config.model
    }
}

#[async_trait::async_trait]
impl ChatProvider for LlmService {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        debug!("Requesting chat completion with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: self.model_for(messages),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .json(&request)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| {
                ProviderError::MalformedResponse("no choices in provider response".to_string())
            })
    }
}
