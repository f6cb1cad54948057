//! Connection lifecycle and capability negotiation.
//!
//! `Uninitialized → Negotiating → Ready → Closed`. The `initialize` request
//! moves a connection to `Negotiating`, the `initialized` notification to
//! `Ready`. Only lifecycle traffic is accepted before `Ready`.

use std::collections::BTreeSet;

use crate::types::{
    Capability, ClientCapabilities, Implementation, InitializeParams, InitializeResult,
    McpError, McpResult, ServerCapabilities,
};

use super::method::RequestMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Negotiating,
    Ready,
    Closed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Negotiating => "negotiating",
            LifecycleState::Ready => "ready",
            LifecycleState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Accept `requested` only if it is one of `supported`. No downgrade.
pub fn negotiate_version(requested: &str, supported: &[String]) -> McpResult<String> {
    if supported.iter().any(|v| v == requested) {
        Ok(requested.to_string())
    } else {
        Err(McpError::UnsupportedProtocolVersion(format!(
            "{requested} (supported: {})",
            supported.join(", ")
        )))
    }
}

/// Server-side negotiator for one connection.
#[derive(Debug, Clone)]
pub struct ServerLifecycle {
    state: LifecycleState,
    server_info: Implementation,
    offered: ServerCapabilities,
    instructions: Option<String>,
    supported_versions: Vec<String>,
    protocol_version: Option<String>,
    client: ClientCapabilities,
    client_info: Option<Implementation>,
}

impl ServerLifecycle {
    /// `offered` is what this server declares and can actually serve.
    pub fn new(
        server_info: Implementation,
        offered: ServerCapabilities,
        instructions: Option<String>,
        supported_versions: Vec<String>,
    ) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            server_info,
            offered,
            instructions,
            supported_versions,
            protocol_version: None,
            client: ClientCapabilities::default(),
            client_info: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    pub fn client_info(&self) -> Option<&Implementation> {
        self.client_info.as_ref()
    }

    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.offered
    }

    pub fn negotiated_server(&self) -> BTreeSet<Capability> {
        self.offered.declared()
    }

    pub fn negotiated_client(&self) -> BTreeSet<Capability> {
        self.client.declared()
    }

    /// Handle `initialize`. A version mismatch closes the connection.
    pub fn initialize(&mut self, params: InitializeParams) -> McpResult<InitializeResult> {
        if self.state != LifecycleState::Uninitialized {
            return Err(McpError::InvalidRequest(format!(
                "initialize received while {}",
                self.state
            )));
        }

        let version = match negotiate_version(&params.protocol_version, &self.supported_versions) {
            Ok(v) => v,
            Err(e) => {
                self.state = LifecycleState::Closed;
                return Err(e);
            }
        };

        tracing::info!(
            "Initialized with client: {} v{} (protocol {version})",
            params.client_info.name,
            params.client_info.version
        );

        self.client = params.capabilities;
        self.client_info = Some(params.client_info);
        self.protocol_version = Some(version.clone());
        self.state = LifecycleState::Negotiating;

        Ok(InitializeResult {
            protocol_version: version,
            capabilities: self.offered.clone(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    /// Handle the `initialized` notification.
    pub fn mark_initialized(&mut self) -> McpResult<()> {
        match self.state {
            LifecycleState::Negotiating => {
                self.state = LifecycleState::Ready;
                tracing::info!("MCP handshake complete");
                Ok(())
            }
            LifecycleState::Ready => Ok(()),
            other => Err(McpError::InvalidRequest(format!(
                "initialized received while {other}"
            ))),
        }
    }

    pub fn shutdown(&mut self) {
        if self.state != LifecycleState::Closed {
            tracing::info!("Connection closed");
        }
        self.state = LifecycleState::Closed;
    }

    /// Reject any non-lifecycle request before `Ready` or after `Closed`.
    pub fn check_ready(&self, method: &str) -> McpResult<()> {
        match self.state {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Closed => Err(McpError::InvalidRequest(format!(
                "connection closed, cannot handle {method}"
            ))),
            _ => Err(McpError::InvalidRequest(format!(
                "not initialized, cannot handle {method}"
            ))),
        }
    }

    /// Methods whose capability was not negotiated do not exist on this connection.
    pub fn check_capability(&self, method: &str) -> McpResult<RequestMethod> {
        let known = RequestMethod::from_method(method)
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))?;
        match known.capability() {
            Some(cap) if !cap.is_server_side() || !self.offered.supports(cap) => {
                Err(McpError::MethodNotFound(method.to_string()))
            }
            _ => Ok(known),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptsCapability, SUPPORTED_PROTOCOL_VERSIONS};

    fn lifecycle() -> ServerLifecycle {
        ServerLifecycle::new(
            Implementation::new("test", "1"),
            ServerCapabilities {
                prompts: Some(PromptsCapability::default()),
                ..ServerCapabilities::default()
            },
            None,
            SUPPORTED_PROTOCOL_VERSIONS.iter().map(|v| v.to_string()).collect(),
        )
    }

    fn params(version: &str) -> InitializeParams {
        InitializeParams {
            protocol_version: version.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new("client", "1"),
        }
    }

    #[test]
    fn test_handshake_reaches_ready() {
        let mut lc = lifecycle();
        assert!(lc.check_ready("prompts/list").is_err());
        let result = lc.initialize(params("2025-06-18")).unwrap();
        assert_eq!(result.protocol_version, "2025-06-18");
        assert_eq!(lc.state(), LifecycleState::Negotiating);
        assert!(lc.check_ready("prompts/list").is_err());
        lc.mark_initialized().unwrap();
        assert!(lc.check_ready("prompts/list").is_ok());
    }

    #[test]
    fn test_version_mismatch_closes() {
        let mut lc = lifecycle();
        let err = lc.initialize(params("1999-01-01")).unwrap_err();
        assert!(matches!(err, McpError::UnsupportedProtocolVersion(_)));
        assert_eq!(lc.state(), LifecycleState::Closed);
    }

    #[test]
    fn test_second_initialize_rejected() {
        let mut lc = lifecycle();
        lc.initialize(params("2025-06-18")).unwrap();
        assert!(matches!(
            lc.initialize(params("2025-06-18")),
            Err(McpError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_initialized_before_initialize_rejected() {
        let mut lc = lifecycle();
        assert!(lc.mark_initialized().is_err());
    }

    #[test]
    fn test_capability_gate() {
        let lc = lifecycle();
        assert!(lc.check_capability("prompts/list").is_ok());
        assert!(matches!(
            lc.check_capability("tools/list"),
            Err(McpError::MethodNotFound(_))
        ));
        assert!(matches!(
            lc.check_capability("roots/list"),
            Err(McpError::MethodNotFound(_))
        ));
        assert!(lc.check_capability("ping").is_ok());
    }

    #[test]
    fn test_closed_rejects_everything() {
        let mut lc = lifecycle();
        lc.initialize(params("2025-06-18")).unwrap();
        lc.mark_initialized().unwrap();
        lc.shutdown();
        assert!(lc.check_ready("ping").is_err());
    }
}
