use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome class of one tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    /// The tool ran and produced output
    Ok,
    /// The tool rejected the call or failed while running
    Error,
    /// The tool exceeded its execution deadline
    Timeout,
}

/// Result of executing one tool invocation, replayed into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Human-readable result text shown to the model
    pub text: String,
    /// Outcome class
    pub status: ObservationStatus,
    /// Whether `text` was cut to fit the configured output cap
    pub truncated: bool,
}

impl Observation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: ObservationStatus::Ok,
            truncated: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: ObservationStatus::Error,
            truncated: false,
        }
    }

    pub fn timeout(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: ObservationStatus::Timeout,
            truncated: false,
        }
    }

    /// Whether the execution completed normally.
    pub fn is_ok(&self) -> bool {
        self.status == ObservationStatus::Ok
    }
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Registered name of the tool to run
    pub tool_name: String,
    /// Keyword arguments forwarded to the handler
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A single entry in a session transcript.
///
/// Order is semantically significant: the transcript is replayed verbatim
/// into every model request, so a model turn is always followed by the
/// observation it caused before the next model turn is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    /// A model response, with the invocation parsed from it (if any)
    Model {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        invocation: Option<ToolInvocation>,
    },
    /// A tool result fed back to the model
    Tool { observation: Observation },
}

/// Ordered, append-only record of one session's conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a model turn.
    pub fn push_model(&mut self, content: impl Into<String>, invocation: Option<ToolInvocation>) {
        self.turns.push(Turn::Model {
            content: content.into(),
            invocation,
        });
    }

    /// Append a tool observation turn.
    pub fn push_observation(&mut self, observation: Observation) {
        self.turns.push(Turn::Tool { observation });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
