//! Host side: one process multiplexing connections to many MCP servers.

pub mod client;
pub mod policy;
pub mod process;

pub use client::McpClient;
pub use policy::{AllowAllPolicy, AllowListPolicy, SecurityPolicy};
pub use process::{HostProcess, SessionInfo};
