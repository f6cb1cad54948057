//! The client interface a host registers and drives.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{Capability, Implementation, McpResult};

/// A connection to one MCP server, as seen by the host.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Identity presented to the host's security policy.
    fn info(&self) -> Implementation;

    /// Run the handshake. Called once, only after the policy accepted.
    async fn connect(&self) -> McpResult<()>;

    async fn disconnect(&self) -> McpResult<()>;

    /// Context this server contributes, typically its `instructions`.
    async fn context(&self) -> String;

    /// Server capabilities negotiated for this connection.
    async fn server_capabilities(&self) -> BTreeSet<Capability>;

    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value>;

    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()>;
}
