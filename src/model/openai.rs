//! OpenAI-compatible chat completions client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

use super::{ModelClient, PromptMessage, SamplingParams};

/// Configuration for the OpenAI-compatible client.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key sent as a bearer token
    pub api_key: String,
    /// Base URL of the API, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Sampling parameters applied to every request
    pub sampling: SamplingParams,
    /// Request timeout in seconds
    pub timeout_seconds: Option<u64>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Configuration is shared through `Arc`, making cloning cheap.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    config: Arc<ModelConfig>,
    client: Client,
}

#[derive(Serialize)]
struct ApiChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct ApiChatResponse {
    choices: Vec<ApiChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ApiChatChoice {
    message: ApiChatMsg,
}

#[derive(Deserialize, Debug)]
struct ApiChatMsg {
    content: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(config: ModelConfig) -> Result<Self, AgentError> {
        if config.api_key.is_empty() {
            return Err(AgentError::Auth("Missing model API key".to_string()));
        }
        let mut builder = Client::builder();
        if let Some(sec) = config.timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(sec));
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a client with a custom HTTP client.
    pub fn with_client(client: Client, config: ModelConfig) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AgentError> {
        let api_messages: Vec<ApiChatMessage> = messages
            .iter()
            .map(|m| ApiChatMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        let body = ApiChatRequest {
            model: &self.config.sampling.model,
            messages: api_messages,
            temperature: self.config.sampling.temperature,
            top_p: self.config.sampling.top_p,
            max_tokens: self.config.sampling.max_output_tokens,
            stream: false,
        };

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("model request payload: {}", json);
            }
        }

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        log::debug!("model HTTP status: {}", status);

        let text = resp.text().await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited(text));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AgentError::Auth(text));
        }
        if !status.is_success() {
            return Err(AgentError::Provider(format!("HTTP {status}: {text}")));
        }

        let parsed: ApiChatResponse =
            serde_json::from_str(&text).map_err(|e| AgentError::ResponseFormat {
                message: e.to_string(),
                raw_response: text,
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AgentError::ResponseFormat {
                message: "no text in model response".to_string(),
                raw_response: String::new(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> ModelConfig {
        ModelConfig {
            api_key: "test-key".to_string(),
            base_url,
            sampling: SamplingParams::new("test-model"),
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"hello"}}]}"#)
            .create_async()
            .await;

        let client = OpenAiCompatClient::new(test_config(server.url())).unwrap();
        let out = client
            .complete(&[PromptMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(out, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = OpenAiCompatClient::new(test_config(server.url())).unwrap();
        let err = client
            .complete(&[PromptMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::RateLimited(_)));
    }

    #[tokio::test]
    async fn empty_response_is_a_format_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = OpenAiCompatClient::new(test_config(server.url())).unwrap();
        let err = client
            .complete(&[PromptMessage::user("hi")])
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::ResponseFormat { .. }));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = test_config("http://localhost".to_string());
        config.api_key = String::new();
        assert!(matches!(
            OpenAiCompatClient::new(config),
            Err(AgentError::Auth(_))
        ));
    }
}
