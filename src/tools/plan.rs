//! Planning tool: records intent before SQL generation, no side effects.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ToolError, ToolHandler};

/// Lets the model record what it intends to do next. The confirmation is
/// echoed into the transcript for traceability; nothing is executed.
pub struct PlanTool;

#[async_trait]
impl ToolHandler for PlanTool {
    fn name(&self) -> &str {
        "plan_step"
    }

    fn description(&self) -> &str {
        "Record the next analysis step before generating SQL. Takes \
         'description' plus optional 'step', 'depends_on' and 'rationale'."
    }

    async fn run(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let description = arguments
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("missing 'description'".to_string()))?;

        let step = arguments
            .get("step")
            .map(|v| v.to_string().trim_matches('"').to_string())
            .unwrap_or_else(|| "N".to_string());
        let depends_on = arguments
            .get("depends_on")
            .and_then(Value::as_str)
            .unwrap_or("None");
        let rationale = arguments
            .get("rationale")
            .and_then(Value::as_str)
            .unwrap_or("Initial step");

        Ok(format!(
            "PLAN RECORDED:\nStep {step}: {description}\nDependencies: {depends_on}\n\
             Rationale: {rationale}\n\nNow generate the SQL for this step with execute_sql."
        ))
    }
}
