//! Chat-completion clients used by the agents.
//!
//! Agents only depend on [`LlmClient`]: a system prompt and a user prompt go in, text comes
//! out. The Ollama adapter talks to `/api/chat` directly over `reqwest` and enforces the
//! request timeout; the bus never times anything out on its own.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by chat-completion providers.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider was unreachable or misconfigured.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider did not answer within the configured timeout.
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
}

/// Prompt pair sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Instructions constraining the output.
    pub system_prompt: String,
    /// Task-specific content.
    pub user_prompt: String,
}

/// Text returned by the provider together with its token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Raw response text.
    pub text: String,
    /// Model that produced the response, when reported.
    pub model: Option<String>,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced in the response.
    pub completion_tokens: u64,
}

impl Completion {
    /// Completion carrying only text, for providers without usage reporting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Black-box chat capability: system prompt + user prompt in, text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmClientError>;
}

/// Build the configured chat client.
pub fn client_from_config(config: &Config) -> Result<OllamaChatClient, LlmClientError> {
    OllamaChatClient::new(
        config.ollama_url.clone(),
        config.llm_model.clone(),
        config.llm_temperature,
        Duration::from_secs(config.llm_timeout_secs),
    )
}

/// Ollama `/api/chat` adapter.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaChatClient {
    /// Build a client for `model` served at `base_url`.
    pub fn new(
        base_url: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmClientError> {
        let http = Client::builder()
            .user_agent("rusty-rfp/agents")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                LlmClientError::ProviderUnavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
            temperature,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "stream": false,
            "options": {
                "temperature": self.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmClientError::Timeout(self.timeout)
                } else {
                    LlmClientError::ProviderUnavailable(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                }
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            LlmClientError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(LlmClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        tracing::debug!(
            model = body.model.as_deref().unwrap_or(&self.model),
            prompt_tokens = body.prompt_eval_count,
            completion_tokens = body.eval_count,
            "Completion received"
        );

        Ok(Completion {
            text: body.message.content.trim().to_string(),
            model: body.model.or_else(|| Some(self.model.clone())),
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(base_url: String) -> OllamaChatClient {
        OllamaChatClient::new(
            base_url,
            "qwen2.5-coder:14b".into(),
            0.1,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "Classify".into(),
            user_prompt: "Batch".into(),
        }
    }

    #[tokio::test]
    async fn chat_client_returns_trimmed_text_and_usage() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/chat")
                    .json_body_partial(r#"{"model":"qwen2.5-coder:14b","stream":false}"#);
                then.status(200).json_body(json!({
                    "model": "qwen2.5-coder:14b",
                    "message": { "role": "assistant", "content": "  {\"a\":1}\n" },
                    "done": true,
                    "prompt_eval_count": 12,
                    "eval_count": 4
                }));
            })
            .await;

        let completion = client(server.base_url())
            .complete(request())
            .await
            .expect("completion");

        mock.assert_async().await;
        assert_eq!(completion.text, "{\"a\":1}");
        assert_eq!(completion.prompt_tokens, 12);
        assert_eq!(completion.completion_tokens, 4);
        assert_eq!(completion.model.as_deref(), Some("qwen2.5-coder:14b"));
    }

    #[tokio::test]
    async fn chat_client_maps_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let error = client(server.base_url())
            .complete(request())
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            LlmClientError::GenerationFailed(ref message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn chat_client_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "partial" },
                    "done": false
                }));
            })
            .await;

        let error = client(server.base_url())
            .complete(request())
            .await
            .expect_err("incomplete");

        assert!(matches!(error, LlmClientError::InvalidResponse(_)));
    }
}
