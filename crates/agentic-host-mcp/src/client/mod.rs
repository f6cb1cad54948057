//! Client side of an MCP connection.

pub mod connection;

pub use connection::{ClientConnection, ClientOptions};
