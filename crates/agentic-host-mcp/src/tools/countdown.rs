//! Tool: countdown. Counts down in steps, reporting progress until cancelled.

use std::time::Duration;

use serde_json::{json, Value};

use agentic_host::{HostError, HostResult, ProgressSink};

use crate::types::{ToolCallResult, ToolDefinition};

const MAX_STEPS: u64 = 1_000;
const MAX_INTERVAL_MS: u64 = 10_000;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "countdown".to_string(),
        description: Some(
            "Count down from `steps`, sleeping `interval_ms` between steps. \
             Sends progress notifications when the call carries a progress token."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "steps": { "type": "integer", "minimum": 0, "maximum": MAX_STEPS },
                "interval_ms": { "type": "integer", "minimum": 0, "default": 100 }
            },
            "required": ["steps"]
        }),
    }
}

pub async fn execute(args: Value, progress: &dyn ProgressSink) -> HostResult<ToolCallResult> {
    let steps = args
        .get("steps")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            HostError::InvalidArguments("steps must be a non-negative integer".to_string())
        })?;
    if steps > MAX_STEPS {
        return Err(HostError::InvalidArguments(format!(
            "steps must be at most {MAX_STEPS}"
        )));
    }
    let interval = args
        .get("interval_ms")
        .and_then(Value::as_u64)
        .unwrap_or(100)
        .min(MAX_INTERVAL_MS);

    let total = steps as f64;
    for done in 0..steps {
        if progress.cancelled() {
            tracing::info!("countdown cancelled after {done} of {steps} steps");
            return Err(HostError::Cancelled);
        }
        tokio::time::sleep(Duration::from_millis(interval)).await;
        let remaining = steps - done - 1;
        progress.report((done + 1) as f64, Some(total), Some(&format!("{remaining} left")));
    }

    Ok(ToolCallResult::json(&json!({
        "steps": steps,
        "status": "done"
    })))
}
