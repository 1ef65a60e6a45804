//! HTTP client for an out-of-process tool server.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::AgentError;
use crate::transcript::{Observation, ToolInvocation};

use super::http::{ExecuteRequest, ExecuteResponse};
use super::ToolDispatch;

/// Dispatches tool invocations to a remote tool server over its
/// `POST /execute` boundary.
pub struct HttpToolClient {
    base_url: String,
    client: Client,
}

impl HttpToolClient {
    /// `timeout_seconds` must exceed the server-side tool timeout, otherwise
    /// the client gives up while the server is still working.
    pub fn new(base_url: impl Into<String>, timeout_seconds: Option<u64>) -> Result<Self, AgentError> {
        let mut builder = Client::builder();
        if let Some(sec) = timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(sec));
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/execute", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ToolDispatch for HttpToolClient {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<Observation, AgentError> {
        let req = ExecuteRequest {
            tool_name: invocation.tool_name.clone(),
            arguments: invocation.arguments.clone(),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::ResourceExhausted(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentError::Http(format!("tool server HTTP {status}: {body}")));
        }

        let body: ExecuteResponse = resp.json().await?;
        Ok(Observation {
            text: body.observation,
            status: body.status,
            truncated: body.truncated,
        })
    }
}
