//! A minimal chat-completion collaborator trait, with one concrete
//! implementation that speaks the OpenAI-compatible chat completions API
//! (the same surface the reference implementation's `OpenAI(api_key=...,
//! base_url=...)` client targets). Every planner/guard role builds its own
//! client lazily from its own resolved `EndpointConfig`; clients are never
//! shared across nodes with differing configs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::error::ModelProviderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// The external LLM endpoint this system orchestrates but does not
/// implement. Production code depends on `Arc<dyn ChatCompletion>` so
/// tests can substitute a stub.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<String, ModelProviderError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(endpoint: EndpointConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .unwrap_or_default();
        OpenAiCompatibleClient { http, endpoint }
    }

    pub fn shared(endpoint: EndpointConfig) -> Arc<dyn ChatCompletion> {
        Arc::new(Self::new(endpoint))
    }

    fn url(&self) -> String {
        let base = self
            .endpoint
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> Result<String, ModelProviderError> {
        let body = ChatCompletionRequest {
            model: &self.endpoint.model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
        };

        let mut request = self.http.post(self.url()).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelProviderError::Request(format!(
                "status {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or(ModelProviderError::EmptyResponse)
    }
}
