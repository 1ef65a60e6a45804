//! Tool execution error types.

/// Failures local to one tool invocation. Never fatal to a session: the
/// executor folds these into error observations the model can react to.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    /// Invalid arguments provided to the tool.
    #[error("invalid tool arguments: {0}")]
    InvalidArgs(String),

    /// Tool execution failed with a message to show the model.
    #[error("tool execution failed: {0}")]
    Execution(String),

    /// Tool not found in registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool timed out.
    #[error("tool timed out after {0}s")]
    Timeout(u64),
}
