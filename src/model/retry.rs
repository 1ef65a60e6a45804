use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::AgentError;

use super::{ModelClient, PromptMessage};

/// Configuration for retry and backoff behavior.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first one
    pub max_attempts: usize,
    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_delay_ms: u64,
    /// Whether to add random jitter to backoff delays
    pub jitter: bool,
}

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

impl RetryPolicy {
    /// Creates a default policy with sane values.
    pub fn defaults() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Wrapper that retries transient model-call failures with exponential backoff.
pub struct RetryingModel {
    inner: Box<dyn ModelClient>,
    policy: RetryPolicy,
}

impl RetryingModel {
    /// Creates a new retrying wrapper around an existing client.
    pub fn new(inner: Box<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn is_retryable(err: &AgentError) -> bool {
        match err {
            AgentError::Http(_) => true,
            AgentError::Timeout(_) => true,
            AgentError::RateLimited(_) => true,
            AgentError::Provider(_) => true,
            AgentError::ResponseFormat { .. } => true,
            AgentError::Json(_) => true,
            AgentError::Auth(_) => false,
            AgentError::InvalidRequest(_) => false,
            AgentError::Parse(_) => false,
            AgentError::ResourceExhausted(_) => false,
            AgentError::RetryExceeded { .. } => false,
            AgentError::Io(_) => false,
        }
    }

    async fn backoff_sleep(&self, attempt_index: usize) {
        let mut delay = self
            .policy
            .base_delay_ms
            .saturating_mul(1u64 << attempt_index.min(16));
        delay = delay.min(self.policy.max_delay_ms);
        if self.policy.jitter {
            let span = (delay / 2).max(1);
            let jitter = ((attempt_index as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1))
                % span;
            delay = delay.saturating_sub(jitter);
        }
        sleep(Duration::from_millis(delay)).await;
    }
}

#[async_trait]
impl ModelClient for RetryingModel {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AgentError> {
        let mut attempts_left = self.policy.max_attempts;
        let mut idx = 0usize;
        let mut last_err: Option<AgentError> = None;

        while attempts_left > 0 {
            match self.inner.complete(messages).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !Self::is_retryable(&err) {
                        return Err(err);
                    }
                    if attempts_left == 1 {
                        last_err = Some(err);
                        break;
                    }
                    log::debug!("retrying model call after error: {err}");
                    last_err = Some(err);
                    self.backoff_sleep(idx).await;
                    attempts_left -= 1;
                    idx += 1;
                }
            }
        }

        Err(AgentError::RetryExceeded {
            attempts: self.policy.max_attempts,
            last_error: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}
