//! The tool server: per-tool bounded worker pools shared by all sessions.
//!
//! Pool discipline is the correctness core of this module: a permit is
//! acquired before a handler runs and released on every exit path — success,
//! error, timeout, or caller cancellation — because it is held as an RAII
//! guard. Requests beyond pool capacity wait in a bounded queue; overflowing
//! the queue fails fast instead of deadlocking the caller.

mod client;
mod http;

pub use client::HttpToolClient;
pub use http::{router, serve, ExecuteRequest, ExecuteResponse};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::AgentError;
use crate::tools::{execute_invocation, ExecutionLimits, ToolRegistry};
use crate::transcript::{Observation, ToolInvocation};

/// How sessions reach tool execution. Implemented by [`ToolServer`] for
/// in-process runs and by [`HttpToolClient`] for an external server; tests
/// substitute scripted stubs.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<Observation, AgentError>;
}

/// Pool sizing and execution limits, fixed for the server's lifetime.
#[derive(Debug, Clone)]
pub struct ToolServerConfig {
    /// Worker count per tool unless overridden
    pub workers_per_tool: usize,
    /// Per-tool worker-count overrides
    pub worker_overrides: HashMap<String, usize>,
    /// Maximum queued requests per tool beyond the running ones
    pub queue_limit: usize,
    /// Limits applied to each execution
    pub limits: ExecutionLimits,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            workers_per_tool: 4,
            worker_overrides: HashMap::new(),
            queue_limit: 64,
            limits: ExecutionLimits::default(),
        }
    }
}

struct WorkerPool {
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    queue_limit: usize,
}

/// Decrements the waiter count even if the caller is cancelled mid-wait.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Process-local service running tool invocations through per-tool pools.
pub struct ToolServer {
    registry: ToolRegistry,
    pools: HashMap<String, WorkerPool>,
    limits: ExecutionLimits,
}

impl ToolServer {
    /// Builds one pool per registered tool; sizes are fixed afterwards.
    pub fn new(registry: ToolRegistry, config: ToolServerConfig) -> Self {
        let pools = registry
            .names()
            .into_iter()
            .map(|name| {
                let workers = config
                    .worker_overrides
                    .get(name)
                    .copied()
                    .unwrap_or(config.workers_per_tool)
                    .max(1);
                log::debug!("tool '{name}': {workers} workers, queue {}", config.queue_limit);
                (
                    name.to_string(),
                    WorkerPool {
                        permits: Arc::new(Semaphore::new(workers)),
                        waiting: AtomicUsize::new(0),
                        queue_limit: config.queue_limit,
                    },
                )
            })
            .collect();

        Self {
            registry,
            pools,
            limits: config.limits,
        }
    }

    /// Run one invocation through its tool's pool.
    ///
    /// Unknown tools yield an error observation without touching any pool.
    /// The only `Err` this returns is `ResourceExhausted` when the tool's
    /// wait queue is saturated.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<Observation, AgentError> {
        let name = invocation.tool_name.as_str();
        let (handler, pool) = match (self.registry.get(name), self.pools.get(name)) {
            (Some(handler), Some(pool)) => (handler, pool),
            _ => {
                return Ok(Observation::error(format!(
                    "EXECUTION RESULT of [{name}]:\nUnknown tool '{name}'. Available tools: {}",
                    self.registry.names().join(", ")
                )));
            }
        };

        let permit = match pool.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = pool.waiting.fetch_add(1, Ordering::SeqCst);
                let slot = QueueSlot(&pool.waiting);
                if queued >= pool.queue_limit {
                    return Err(AgentError::ResourceExhausted(format!(
                        "tool '{name}' already has {queued} queued requests"
                    )));
                }
                let permit = pool
                    .permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| {
                        AgentError::ResourceExhausted(format!("tool '{name}' pool closed"))
                    })?;
                drop(slot);
                permit
            }
        };

        let observation =
            execute_invocation(handler.as_ref(), &invocation.arguments, self.limits).await;
        drop(permit);
        Ok(observation)
    }
}

#[async_trait]
impl ToolDispatch for ToolServer {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<Observation, AgentError> {
        ToolServer::execute(self, invocation).await
    }
}
