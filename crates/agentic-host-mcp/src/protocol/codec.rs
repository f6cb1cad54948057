//! Mapping between [`JsonRpcMessage`] and JSON documents.
//!
//! Decoding infers the message shape from which of `id`, `method`, `result`
//! and `error` are present, and checks nothing beyond shape.

use serde_json::{Map, Value};

use crate::types::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcVersion, McpError, McpResult, RequestId, JSONRPC_VERSION,
};

/// Encode a message as a JSON document.
pub fn encode(message: &JsonRpcMessage) -> McpResult<Value> {
    serde_json::to_value(message).map_err(|e| McpError::InternalError(e.to_string()))
}

/// Decode a JSON document into a message.
pub fn decode(value: Value) -> McpResult<JsonRpcMessage> {
    let Value::Object(mut obj) = value else {
        return Err(McpError::InvalidRequest(
            "message must be a JSON object".to_string(),
        ));
    };

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(McpError::InvalidRequest(format!(
                "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{other}\""
            )))
        }
        None => {
            return Err(McpError::InvalidRequest(
                "missing jsonrpc version".to_string(),
            ))
        }
    }

    let has_method = obj.contains_key("method");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if has_result && has_error {
        return Err(McpError::InvalidRequest(
            "message carries both result and error".to_string(),
        ));
    }

    if has_method {
        if has_result || has_error {
            return Err(McpError::InvalidRequest(
                "request carries a result or error".to_string(),
            ));
        }
        let method = take_method(&mut obj)?;
        let params = obj.remove("params");
        return Ok(match obj.remove("id") {
            Some(id) => JsonRpcMessage::Request(JsonRpcRequest {
                jsonrpc: JsonRpcVersion,
                id: decode_id(id)?,
                method,
                params,
            }),
            None => JsonRpcMessage::Notification(JsonRpcNotification {
                jsonrpc: JsonRpcVersion,
                method,
                params,
            }),
        });
    }

    if !has_result && !has_error {
        return Err(McpError::InvalidRequest(
            "message has neither method, result nor error".to_string(),
        ));
    }

    let id = match obj.remove("id") {
        Some(id) => decode_id(id)?,
        None => {
            return Err(McpError::InvalidRequest(
                "response is missing its id".to_string(),
            ))
        }
    };

    if let Some(result) = obj.remove("result") {
        return Ok(JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion,
            id,
            result,
        }));
    }

    let error = obj
        .remove("error")
        .map(decode_error_object)
        .transpose()?
        .ok_or_else(|| McpError::InvalidRequest("missing error object".to_string()))?;

    Ok(JsonRpcMessage::Error(JsonRpcError {
        jsonrpc: JsonRpcVersion,
        id,
        error,
    }))
}

/// Decode a request id. Anything other than a string, an integer or null is
/// a parse error.
pub fn decode_id(value: Value) -> McpResult<RequestId> {
    match value {
        Value::String(s) => Ok(RequestId::String(s)),
        Value::Null => Ok(RequestId::Null),
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| McpError::ParseError(format!("request id {n} is not an integer"))),
        other => Err(McpError::ParseError(format!(
            "request id must be a string, integer or null, got {other}"
        ))),
    }
}

/// Best-effort id recovery for error replies to documents that failed to decode.
pub fn recover_id(value: &Value) -> RequestId {
    value
        .get("id")
        .cloned()
        .and_then(|id| decode_id(id).ok())
        .unwrap_or(RequestId::Null)
}

fn take_method(obj: &mut Map<String, Value>) -> McpResult<String> {
    match obj.remove("method") {
        Some(Value::String(method)) => Ok(method),
        _ => Err(McpError::InvalidRequest(
            "method must be a string".to_string(),
        )),
    }
}

fn decode_error_object(value: Value) -> McpResult<JsonRpcErrorObject> {
    let Value::Object(mut obj) = value else {
        return Err(McpError::InvalidRequest(
            "error must be an object".to_string(),
        ));
    };

    let code = obj
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok())
        .ok_or_else(|| McpError::InvalidRequest("error code must be an integer".to_string()))?;

    let message = match obj.remove("message") {
        Some(Value::String(m)) => m,
        _ => {
            return Err(McpError::InvalidRequest(
                "error message must be a string".to_string(),
            ))
        }
    };

    Ok(JsonRpcErrorObject {
        code,
        message,
        data: obj.remove("data"),
    })
}
