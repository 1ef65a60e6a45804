//! Tool handlers and the registry that dispatches to them by name.
//!
//! A tool is a named capability the agent can invoke: run a SQL statement,
//! read a document, record a plan step. Handlers know nothing about
//! conversations or pools; they turn one argument map into text or a
//! [`ToolError`]. Timeouts and output caps are applied by the executor.

mod docs;
mod error;
mod executor;
mod plan;
mod sql;

pub use docs::{DocumentListTool, DocumentReadTool};
pub use error::ToolError;
pub use executor::{execute_invocation, ExecutionLimits};
pub use plan::PlanTool;
pub use sql::{SqlTool, WarehouseConfig};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A named capability the agent can invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Registered name, referenced by the model in its actions.
    fn name(&self) -> &str;

    /// One-line description advertised in the system prompt.
    fn description(&self) -> &str;

    /// Run one invocation against the backing resource.
    async fn run(&self, arguments: &Map<String, Value>) -> Result<String, ToolError>;
}

/// Stores tool handlers identified by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a handler under its own name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        if self.tools.insert(name.clone(), handler).is_some() {
            log::warn!("tool '{name}' registered twice; keeping the latest");
        }
    }

    /// Retrieves a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted for stable prompt and error text.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        pairs.sort_unstable_by_key(|(name, _)| *name);
        pairs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Handler returning a fixed string; used across module tests.
    pub struct StaticTool {
        pub name: &'static str,
        pub reply: &'static str,
    }

    #[async_trait]
    impl ToolHandler for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "static test tool"
        }

        async fn run(&self, _arguments: &Map<String, Value>) -> Result<String, ToolError> {
            Ok(self.reply.to_string())
        }
    }
}
