//! Stdio transport: reads JSON-RPC from stdin, writes to stdout.

use tokio::io::{BufReader, Stdin, Stdout};

use super::framing::FramedTransport;

/// Stdio transport for desktop MCP clients.
pub type StdioTransport = FramedTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        tracing::info!("Stdio transport started");
        FramedTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}
