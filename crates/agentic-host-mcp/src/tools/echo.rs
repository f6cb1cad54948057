//! Tool: echo. Returns the given text unchanged.

use serde_json::{json, Value};

use agentic_host::{HostError, HostResult};

use crate::types::{ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "echo".to_string(),
        description: Some("Return the given text unchanged".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo back" }
            },
            "required": ["text"]
        }),
    }
}

pub fn execute(args: Value) -> HostResult<ToolCallResult> {
    let text = args
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::InvalidArguments("text must be a string".to_string()))?;

    Ok(ToolCallResult::text(text.to_string()))
}
