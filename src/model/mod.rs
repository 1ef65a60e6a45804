//! Model API boundary.
//!
//! Sessions talk to the model through [`ModelClient`]; the shipped
//! implementation targets any OpenAI-compatible chat completions endpoint.
//! [`RetryingModel`] wraps a client with bounded exponential backoff so the
//! session state machine never sees a transient failure.

mod openai;
mod retry;

pub use openai::{ModelConfig, OpenAiCompatClient};
pub use retry::{RetryPolicy, RetryingModel};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Role of a message in a model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl PromptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        }
    }
}

/// A single message in a model request.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling configuration forwarded verbatim to the model API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Output-token budget per response
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl SamplingParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            top_p: None,
            max_output_tokens: None,
        }
    }
}

/// A client able to turn an ordered prompt into one model response.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AgentError>;
}
