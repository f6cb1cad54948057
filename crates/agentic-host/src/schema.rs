//! Argument validation against a tool's input schema.
//!
//! Full JSON-Schema evaluation is delegated to whatever validator the host
//! plugs in. The built-in validator only checks the top-level shape and the
//! `required` list, which is enough to reject obviously malformed calls.

use serde_json::Value;

use crate::types::{HostError, HostResult};

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Value, arguments: &Value) -> HostResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredFieldsValidator;

impl SchemaValidator for RequiredFieldsValidator {
    fn validate(&self, schema: &Value, arguments: &Value) -> HostResult<()> {
        if schema.get("type").and_then(Value::as_str) == Some("object") && !arguments.is_object() {
            return Err(HostError::InvalidArguments(
                "arguments must be an object".to_string(),
            ));
        }

        let Some(required) = schema.get("required").and_then(Value::as_array) else {
            return Ok(());
        };

        for field in required.iter().filter_map(Value::as_str) {
            if arguments.get(field).map_or(true, Value::is_null) {
                return Err(HostError::MissingArgument(field.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    #[test]
    fn test_accepts_complete_arguments() {
        assert!(RequiredFieldsValidator
            .validate(&schema(), &json!({ "text": "hi" }))
            .is_ok());
    }

    #[test]
    fn test_rejects_missing_required() {
        let err = RequiredFieldsValidator
            .validate(&schema(), &json!({}))
            .unwrap_err();
        assert!(matches!(err, HostError::MissingArgument(f) if f == "text"));
    }

    #[test]
    fn test_rejects_null_required() {
        assert!(RequiredFieldsValidator
            .validate(&schema(), &json!({ "text": null }))
            .is_err());
    }

    #[test]
    fn test_rejects_non_object() {
        let err = RequiredFieldsValidator
            .validate(&schema(), &json!([1, 2]))
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidArguments(_)));
    }

    #[test]
    fn test_schema_without_required() {
        assert!(RequiredFieldsValidator
            .validate(&json!({ "type": "object" }), &json!({}))
            .is_ok());
    }
}
