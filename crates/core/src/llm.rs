//! Shared LLM client for chat-completion calls against an NVIDIA NIM /
//! Mistral-compatible endpoint — one place for HTTP plumbing, auth, and
//! response parsing so the router, Build agent, and Inbox summarizer all go
//! through the same client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{CoreError, Result};

const NVIDIA_API_URL: &str = "https://integrate.api.nvidia.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "mistralai/mixtral-8x7b-instruct-v0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Abstraction over the chat-completion call so agents and the router can
/// be tested against a stub without reaching the network.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Result<String>;
}

pub struct NimClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl NimClient {
    pub fn new(config: &LlmConfig) -> Self {
        NimClient {
            http: reqwest::Client::new(),
            api_key: config.nvidia_api_key.clone(),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl LlmClient for NimClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CoreError::Config("NVIDIA_API_KEY not configured".to_string()))?;

        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(NVIDIA_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient(String);

    #[async_trait]
    impl LlmClient for StubClient {
        async fn complete(&self, _messages: &[ChatMessage], _t: f32, _m: u32) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn stub_roundtrips_content() {
        let client = StubClient("hello".to_string());
        let out = client.complete(&[ChatMessage::user("hi")], 0.1, 10).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn missing_api_key_yields_config_error() {
        let config = LlmConfig::default();
        let client = NimClient::new(&config);
        assert!(client.api_key.is_none());
    }
}
