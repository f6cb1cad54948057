//! JSON-RPC envelope validation and `_meta` key rules.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::types::{JsonRpcRequest, McpError, McpResult};

/// Validate a decoded request beyond its shape: method name, params type
/// and `_meta` keys. The `jsonrpc` member is checked by its type.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    if let Some(params) = &request.params {
        if !params.is_object() && !params.is_null() {
            return Err(McpError::InvalidRequest(
                "params must be an object".to_string(),
            ));
        }
        validate_meta(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;
    }

    Ok(())
}

/// Check every key of `payload._meta`, if present.
pub fn validate_meta(payload: &Value) -> McpResult<()> {
    match payload.get("_meta") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Object(meta)) => meta.keys().try_for_each(|k| validate_meta_key(k)),
        Some(_) => Err(McpError::InvalidParams("_meta must be an object".to_string())),
    }
}

type Pattern = OnceLock<Result<Regex, regex::Error>>;

fn compiled(cell: &'static Pattern, pattern: &str) -> McpResult<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| McpError::InternalError(format!("bad _meta pattern: {e}")))
}

const LABEL: &str = r"^[A-Za-z](?:[A-Za-z0-9-]*[A-Za-z0-9])?$";
const NAME: &str = r"^(?:[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)?$";
const RESERVED: &str = r"(?i)(?:^|\.)(?:modelcontextprotocol|mcp)\.";

fn label_re() -> McpResult<&'static Regex> {
    static RE: Pattern = OnceLock::new();
    compiled(&RE, LABEL)
}

fn name_re() -> McpResult<&'static Regex> {
    static RE: Pattern = OnceLock::new();
    compiled(&RE, NAME)
}

fn reserved_re() -> McpResult<&'static Regex> {
    static RE: Pattern = OnceLock::new();
    compiled(&RE, RESERVED)
}

/// A key is `name` or `prefix/name`. Prefixes are dot-separated DNS-style
/// labels; `mcp.` and `modelcontextprotocol.` label sequences are reserved.
pub fn validate_meta_key(key: &str) -> McpResult<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() {
            return Err(McpError::InvalidParams(format!(
                "_meta prefix must not be empty: {key}"
            )));
        }
        if name.contains('/') {
            return Err(McpError::InvalidParams(format!(
                "_meta key may contain at most one '/': {key}"
            )));
        }
        let label = label_re()?;
        if !prefix.split('.').all(|l| label.is_match(l)) {
            return Err(McpError::InvalidParams(format!("Invalid _meta prefix: {key}")));
        }
        if reserved_re()?.is_match(prefix) {
            return Err(McpError::InvalidParams(format!(
                "Reserved _meta prefix: {prefix}/"
            )));
        }
    }

    if !name_re()?.is_match(name) {
        return Err(McpError::InvalidParams(format!("Invalid _meta name: {key}")));
    }

    Ok(())
}
