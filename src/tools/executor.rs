//! Single-invocation executor: deadline, output cap, observation shaping.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::transcript::Observation;

use super::ToolHandler;

/// Limits applied to every tool execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    /// Per-invocation deadline
    pub timeout: Duration,
    /// Maximum observation length in characters
    pub max_output_chars: usize,
}

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_OUTPUT_CHARS: usize = 8_000;

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

/// Run one invocation through `handler` and shape the outcome into an
/// [`Observation`].
///
/// On deadline expiry the handler future is dropped, which aborts any
/// in-flight request it was awaiting; the session sees a `timeout`
/// observation instead of blocking.
pub async fn execute_invocation(
    handler: &dyn ToolHandler,
    arguments: &Map<String, Value>,
    limits: ExecutionLimits,
) -> Observation {
    let name = handler.name();
    match tokio::time::timeout(limits.timeout, handler.run(arguments)).await {
        Ok(Ok(output)) => {
            let (text, truncated) = cap_output(&output, limits.max_output_chars);
            let mut obs = Observation::ok(prefixed(name, &text));
            obs.truncated = truncated;
            obs
        }
        Ok(Err(err)) => {
            log::debug!("tool '{name}' failed: {err}");
            Observation::error(prefixed(name, &err.to_string()))
        }
        Err(_) => {
            log::warn!(
                "tool '{name}' timed out after {}s",
                limits.timeout.as_secs()
            );
            Observation::timeout(prefixed(
                name,
                &format!("Execution timed out after {} seconds.", limits.timeout.as_secs()),
            ))
        }
    }
}

fn prefixed(name: &str, body: &str) -> String {
    format!("EXECUTION RESULT of [{name}]:\n{body}")
}

/// Cut `output` to at most `cap` characters, preferring the last complete
/// line, and annotate what was dropped.
fn cap_output(output: &str, cap: usize) -> (String, bool) {
    let total_chars = output.chars().count();
    if total_chars <= cap {
        return (output.to_string(), false);
    }

    let cut: String = output.chars().take(cap).collect();
    let kept = match cut.rfind('\n') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    let text = format!(
        "{kept}\n\nNote: output truncated to {cap} characters; the full result contained {total_chars} characters."
    );
    (text, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::StaticTool;
    use crate::tools::{ToolError, ToolHandler};
    use crate::transcript::ObservationStatus;
    use async_trait::async_trait;

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps forever"
        }

        async fn run(&self, _arguments: &Map<String, Value>) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn run(&self, _arguments: &Map<String, Value>) -> Result<String, ToolError> {
            Err(ToolError::Execution("backend rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn success_is_prefixed_with_the_tool_name() {
        let tool = StaticTool {
            name: "echo",
            reply: "hello",
        };
        let obs = execute_invocation(&tool, &Map::new(), ExecutionLimits::default()).await;
        assert_eq!(obs.status, ObservationStatus::Ok);
        assert_eq!(obs.text, "EXECUTION RESULT of [echo]:\nhello");
        assert!(!obs.truncated);
    }

    #[tokio::test]
    async fn handler_errors_become_error_observations() {
        let obs = execute_invocation(&FailingTool, &Map::new(), ExecutionLimits::default()).await;
        assert_eq!(obs.status, ObservationStatus::Error);
        assert!(obs.text.contains("backend rejected"));
    }

    #[tokio::test]
    async fn deadline_expiry_yields_timeout_observation() {
        let limits = ExecutionLimits {
            timeout: Duration::from_millis(20),
            max_output_chars: 1000,
        };
        let obs = execute_invocation(&SlowTool, &Map::new(), limits).await;
        assert_eq!(obs.status, ObservationStatus::Timeout);
        assert!(obs.text.contains("timed out"));
    }

    #[test]
    fn long_output_is_cut_at_a_line_boundary() {
        let output = (0..100)
            .map(|i| format!("row {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let (text, truncated) = cap_output(&output, 40);
        assert!(truncated);
        assert!(text.contains("Note: output truncated to 40 characters"));
        // Kept portion ends on a complete line, not mid-"row".
        let kept = text.split("\n\nNote:").next().unwrap();
        assert_eq!(kept, "row 0\nrow 1\nrow 2\nrow 3\nrow 4\nrow 5");
    }

    #[test]
    fn short_output_is_untouched() {
        let (text, truncated) = cap_output("tiny", 100);
        assert_eq!(text, "tiny");
        assert!(!truncated);
    }
}
