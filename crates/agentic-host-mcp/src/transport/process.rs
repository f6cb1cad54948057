//! Child-process transport: spawns an MCP server and speaks over its stdio.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::types::{McpError, McpResult};

use super::framing::FramedTransport;
use super::Transport;

pub struct ProcessTransport {
    inner: FramedTransport<BufReader<ChildStdout>, ChildStdin>,
    child: Mutex<Child>,
}

impl ProcessTransport {
    /// Spawn `program` with `args`. The child's stderr is inherited so its logs stay visible.
    pub fn spawn(program: &str, args: &[String], env: &[(String, String)]) -> McpResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(McpError::Io)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;

        tracing::info!("Spawned MCP server process: {program}");

        Ok(Self {
            inner: FramedTransport::new(BufReader::new(stdout), stdin),
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn read_message(&self) -> McpResult<Option<Value>> {
        self.inner.read_message().await
    }

    async fn write_message(&self, message: &Value) -> McpResult<()> {
        self.inner.write_message(message).await
    }

    async fn close(&self) -> McpResult<()> {
        if let Err(e) = self.inner.close().await {
            tracing::debug!("Closing child stdin failed: {e}");
        }
        let mut child = self.child.lock().await;
        if child.try_wait().map_err(McpError::Io)?.is_none() {
            child.kill().await.map_err(McpError::Io)?;
        }
        Ok(())
    }
}
