//! Error types and JSON-RPC error codes for the MCP engine.

use agentic_host::HostError;

use super::message::{JsonRpcError, JsonRpcErrorObject, JsonRpcVersion, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes. Never renumbered; new kinds get new codes.
pub mod mcp_error_codes {
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const PROMPT_NOT_FOUND: i32 = -32804;

    /// A request id reused while the earlier request is still outstanding.
    pub const DUPLICATE_REQUEST_ID: i32 = -32850;
    /// The initialize request named a protocol version the peer does not speak.
    pub const UNSUPPORTED_PROTOCOL_VERSION: i32 = -32851;
    /// A bounded wait elapsed.
    pub const REQUEST_TIMEOUT: i32 = -32852;

    /// A per-key request budget for the current window is spent.
    pub const RATE_LIMITED: i32 = -32001;

    /// Unauthorized: no authorization strategy accepted the credential.
    pub const UNAUTHORIZED: i32 = -32900;
    /// The principal lacks the scope an operation requires.
    pub const ACCESS_DENIED: i32 = -32901;
    /// Host security policy rejected a client.
    pub const SECURITY_POLICY: i32 = -32903;
}

/// All errors that can occur in the MCP engine.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Unauthorized: {0}")]
    Authorization(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Security policy violation: {0}")]
    Security(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Duplicate request id: {0}")]
    DuplicateIdentifier(RequestId),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::Authorization(_) => UNAUTHORIZED,
            McpError::AccessDenied(_) => ACCESS_DENIED,
            McpError::Security(_) => SECURITY_POLICY,
            McpError::RateLimited(_) => RATE_LIMITED,
            McpError::DuplicateIdentifier(_) => DUPLICATE_REQUEST_ID,
            McpError::Timeout(_) => REQUEST_TIMEOUT,
            McpError::UnsupportedProtocolVersion(_) => UNSUPPORTED_PROTOCOL_VERSION,
            McpError::RequestCancelled => REQUEST_CANCELLED,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::PromptNotFound(_) => PROMPT_NOT_FOUND,
            McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JsonRpcVersion,
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }

    /// Rebuild an error from a peer's error object, keeping the code's meaning
    /// where one is known.
    pub fn from_error_object(error: &JsonRpcErrorObject) -> Self {
        use error_codes::*;
        use mcp_error_codes::*;
        let message = error.message.clone();
        match error.code {
            PARSE_ERROR => McpError::ParseError(message),
            INVALID_REQUEST => McpError::InvalidRequest(message),
            METHOD_NOT_FOUND => McpError::MethodNotFound(message),
            INVALID_PARAMS => McpError::InvalidParams(message),
            REQUEST_CANCELLED => McpError::RequestCancelled,
            RESOURCE_NOT_FOUND => McpError::ResourceNotFound(message),
            TOOL_NOT_FOUND => McpError::ToolNotFound(message),
            PROMPT_NOT_FOUND => McpError::PromptNotFound(message),
            UNSUPPORTED_PROTOCOL_VERSION => McpError::UnsupportedProtocolVersion(message),
            UNAUTHORIZED => McpError::Authorization(message),
            ACCESS_DENIED => McpError::AccessDenied(message),
            SECURITY_POLICY => McpError::Security(message),
            RATE_LIMITED => McpError::RateLimited(message),
            _ => McpError::InternalError(format!("{} (code {})", message, error.code)),
        }
    }
}

impl From<HostError> for McpError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::InvalidCursor(_)
            | HostError::InvalidArguments(_)
            | HostError::MissingArgument(_)
            | HostError::UnknownReference(_) => McpError::InvalidParams(e.to_string()),
            HostError::ToolNotFound(name) => McpError::ToolNotFound(name),
            HostError::PromptNotFound(name) => McpError::PromptNotFound(name),
            HostError::ResourceNotFound(uri) => McpError::ResourceNotFound(uri),
            HostError::Cancelled => McpError::RequestCancelled,
            HostError::Provider(msg) => McpError::InternalError(msg),
            HostError::Json(e) => McpError::InvalidParams(e.to_string()),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = [
            McpError::ParseError(String::new()),
            McpError::InvalidRequest(String::new()),
            McpError::MethodNotFound(String::new()),
            McpError::InvalidParams(String::new()),
            McpError::InternalError(String::new()),
            McpError::Authorization(String::new()),
            McpError::Security(String::new()),
            McpError::AccessDenied(String::new()),
            McpError::RateLimited(String::new()),
            McpError::DuplicateIdentifier(RequestId::Null),
            McpError::Timeout(1),
            McpError::UnsupportedProtocolVersion(String::new()),
            McpError::RequestCancelled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(McpError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_host_errors_map_to_protocol_codes() {
        let e: McpError = HostError::InvalidCursor("x".to_string()).into();
        assert_eq!(e.code(), error_codes::INVALID_PARAMS);
        let e: McpError = HostError::ToolNotFound("t".to_string()).into();
        assert_eq!(e.code(), mcp_error_codes::TOOL_NOT_FOUND);
    }

    #[test]
    fn test_error_response_keeps_id() {
        let err = McpError::MethodNotFound("tools/list".to_string())
            .to_json_rpc_error(RequestId::Number(7));
        assert_eq!(err.id, RequestId::Number(7));
        assert_eq!(err.error.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_round_trip_through_error_object() {
        let original = McpError::MethodNotFound("x".to_string());
        let object = original.to_json_rpc_error(RequestId::Null).error;
        assert_eq!(McpError::from_error_object(&object).code(), original.code());
    }
}
