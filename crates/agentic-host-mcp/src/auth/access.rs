//! Per-principal access to tools and resources.

use crate::types::{McpError, McpResult};

use super::principal::Principal;

/// Grants every scoped operation.
pub const SCOPE_ALL: &str = "*";
/// Grants `tools/call` for every tool; `tools:call:<name>` grants one.
pub const SCOPE_TOOLS_CALL: &str = "tools:call";
/// Grants `resources/read` for every URI; `resources:read:<uri>` grants one.
pub const SCOPE_RESOURCES_READ: &str = "resources:read";

/// Decides whether a session's principal may call a tool or read a resource.
/// `principal` is `None` on unauthenticated connections.
pub trait AccessPolicy: Send + Sync {
    fn allow_tool(&self, principal: Option<&Principal>, tool: &str) -> bool;

    fn allow_resource(&self, principal: Option<&Principal>, uri: &str) -> bool;

    fn require_tool(&self, principal: Option<&Principal>, tool: &str) -> McpResult<()> {
        if self.allow_tool(principal, tool) {
            Ok(())
        } else {
            Err(denied(principal, &format!("tool {tool}")))
        }
    }

    fn require_resource(&self, principal: Option<&Principal>, uri: &str) -> McpResult<()> {
        if self.allow_resource(principal, uri) {
            Ok(())
        } else {
            Err(denied(principal, &format!("resource {uri}")))
        }
    }
}

fn denied(principal: Option<&Principal>, target: &str) -> McpError {
    let who = principal.map_or("anonymous", |p| p.id.as_str());
    tracing::warn!("Denied {who} access to {target}");
    McpError::AccessDenied(format!("{who} may not use {target}"))
}

/// Used when no authorization is configured.
pub struct AllowAllAccess;

impl AccessPolicy for AllowAllAccess {
    fn allow_tool(&self, _principal: Option<&Principal>, _tool: &str) -> bool {
        true
    }

    fn allow_resource(&self, _principal: Option<&Principal>, _uri: &str) -> bool {
        true
    }
}

/// Grants by principal scope. A connection without a principal gets nothing.
pub struct ScopeAccessPolicy;

impl ScopeAccessPolicy {
    fn grants(principal: Option<&Principal>, family: &str, target: &str) -> bool {
        let Some(principal) = principal else {
            return false;
        };
        principal.has_scope(SCOPE_ALL)
            || principal.has_scope(family)
            || principal.has_scope(&format!("{family}:{target}"))
    }
}

impl AccessPolicy for ScopeAccessPolicy {
    fn allow_tool(&self, principal: Option<&Principal>, tool: &str) -> bool {
        Self::grants(principal, SCOPE_TOOLS_CALL, tool)
    }

    fn allow_resource(&self, principal: Option<&Principal>, uri: &str) -> bool {
        Self::grants(principal, SCOPE_RESOURCES_READ, uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(scopes: &[&str]) -> Principal {
        Principal::new("alice", scopes.iter().copied())
    }

    #[test]
    fn test_scope_grants() {
        let policy = ScopeAccessPolicy;

        let all = principal(&["*"]);
        assert!(policy.allow_tool(Some(&all), "echo"));
        assert!(policy.allow_resource(Some(&all), "file:///a"));

        let tools = principal(&["tools:call"]);
        assert!(policy.allow_tool(Some(&tools), "countdown"));
        assert!(!policy.allow_resource(Some(&tools), "file:///a"));

        let narrow = principal(&["tools:call:echo", "resources:read:file:///a"]);
        assert!(policy.allow_tool(Some(&narrow), "echo"));
        assert!(!policy.allow_tool(Some(&narrow), "countdown"));
        assert!(policy.allow_resource(Some(&narrow), "file:///a"));
        assert!(!policy.allow_resource(Some(&narrow), "file:///b"));
    }

    #[test]
    fn test_no_principal_is_denied() {
        let err = ScopeAccessPolicy.require_tool(None, "echo").unwrap_err();
        assert!(matches!(err, McpError::AccessDenied(ref m) if m.contains("anonymous")));
        assert!(AllowAllAccess.require_tool(None, "echo").is_ok());
    }

    #[test]
    fn test_unscoped_principal_is_denied() {
        let reader = principal(&["read"]);
        let err = ScopeAccessPolicy
            .require_resource(Some(&reader), "file:///a")
            .unwrap_err();
        assert_eq!(err.code(), crate::types::mcp_error_codes::ACCESS_DENIED);
    }
}
