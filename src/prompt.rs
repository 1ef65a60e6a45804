//! Prompt text seeded into every session.

use crate::tools::ToolRegistry;

/// Instruction appended after a malformed model response. Fed back as an
/// error observation; a second consecutive failure ends the session.
pub const REPROMPT: &str = "Your last response did not contain a valid action. \
Respond with exactly one fenced ```action block containing either \
{\"tool\": \"<name>\", \"arguments\": {...}} or {\"answer\": \"<final answer>\"}.";

/// Build the default system prompt, advertising the registered tools.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    let tool_list = registry
        .descriptions()
        .into_iter()
        .map(|(name, description)| format!("- {name}: {description}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a careful data analyst. Answer the question by querying the
available tools, then submit your final answer.

On every turn respond with exactly one action inside a fenced block:

```action
{{"tool": "<tool name>", "arguments": {{...}}}}
```

or, once you are confident in the final answer:

```action
{{"answer": "<final answer>"}}
```

# Available tools

{tool_list}

Rules:
- Issue one tool call per turn and wait for its result before continuing.
- Tool failures are shown to you; revise the call and try again.
- Keep every SQL statement self-contained; session state does not persist
  between calls.
- Submit the final answer as plain text, not as SQL."#
    )
}
