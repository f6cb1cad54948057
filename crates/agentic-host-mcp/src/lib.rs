//! AgenticHost MCP: protocol engine, host process and transports for the
//! Model Context Protocol.

pub mod auth;
pub mod client;
pub mod config;
pub mod host;
pub mod protocol;
#[cfg(feature = "http")]
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::{ClientConnection, ClientOptions};
pub use config::{resolve_config_path, HostConfig, ServerConfig};
pub use host::{HostProcess, McpClient};
pub use protocol::{serve_connection, ProtocolHandler, Providers};
pub use transport::{StdioTransport, Transport};
