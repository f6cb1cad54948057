//! Transport layer for MCP communication.
//!
//! A transport moves whole JSON documents; framing is its own business.

pub mod channel;
pub mod framing;
#[cfg(feature = "http")]
pub mod http;
pub mod process;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::McpResult;

pub use channel::ChannelTransport;
pub use framing::FramedTransport;
#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use process::ProcessTransport;
pub use stdio::StdioTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Next document from the peer, or `None` once the peer has gone away.
    async fn read_message(&self) -> McpResult<Option<Value>>;

    async fn write_message(&self, message: &Value) -> McpResult<()>;

    async fn close(&self) -> McpResult<()>;
}
