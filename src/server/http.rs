//! HTTP surface of the tool server.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::transcript::{ObservationStatus, ToolInvocation};

use super::ToolServer;

/// Wire request for `POST /execute`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Wire response for `POST /execute`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub observation: String,
    pub status: ObservationStatus,
    pub truncated: bool,
}

/// Build the tool-server router.
pub fn router(server: Arc<ToolServer>) -> Router {
    Router::new()
        .route("/execute", post(handle_execute))
        .route("/health", get(handle_health))
        .with_state(server)
}

async fn handle_execute(
    State(server): State<Arc<ToolServer>>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, (StatusCode, String)> {
    let invocation = ToolInvocation::new(req.tool_name, req.arguments);
    match server.execute(&invocation).await {
        Ok(obs) => Ok(Json(ExecuteResponse {
            observation: obs.text,
            status: obs.status,
            truncated: obs.truncated,
        })),
        Err(AgentError::ResourceExhausted(msg)) => Err((StatusCode::SERVICE_UNAVAILABLE, msg)),
        Err(err) => Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string())),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Bind `addr` and serve until the process exits.
///
/// A bind failure is the caller's signal to abort the whole run; everything
/// after a successful bind is per-request.
pub async fn serve(server: Arc<ToolServer>, addr: &str) -> Result<(), AgentError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Ok(local) = listener.local_addr() {
        log::info!("tool server listening on {local}");
    }
    axum::serve(listener, router(server))
        .await
        .map_err(|e| AgentError::Http(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::StaticTool;
    use crate::tools::ToolRegistry;
    use crate::server::ToolServerConfig;

    async fn spawn_server() -> String {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool {
            name: "echo",
            reply: "pong",
        }));
        let server = Arc::new(ToolServer::new(registry, ToolServerConfig::default()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(server)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn execute_round_trips_over_http() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/execute"))
            .json(&ExecuteRequest {
                tool_name: "echo".to_string(),
                arguments: Map::new(),
            })
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let body: ExecuteResponse = resp.json().await.unwrap();
        assert_eq!(body.status, ObservationStatus::Ok);
        assert!(body.observation.contains("pong"));
        assert!(!body.truncated);
    }

    #[tokio::test]
    async fn unknown_tool_rides_inside_the_observation() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let body: ExecuteResponse = client
            .post(format!("{base}/execute"))
            .json(&ExecuteRequest {
                tool_name: "missing".to_string(),
                arguments: Map::new(),
            })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.status, ObservationStatus::Error);
        assert!(body.observation.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let base = spawn_server().await;
        let body = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
