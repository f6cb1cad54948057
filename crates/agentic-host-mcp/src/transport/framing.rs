//! Message framing for newline-delimited JSON.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::types::{McpError, McpResult};

use super::Transport;

/// Parse a single line of text as a JSON document.
pub fn parse_line(line: &str) -> McpResult<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message(value: &Value) -> McpResult<String> {
    let mut json = serde_json::to_string(value).map_err(McpError::Json)?;
    json.push('\n');
    Ok(json)
}

/// One JSON document per line over any buffered reader / writer pair.
pub struct FramedTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> Transport for FramedTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_message(&self) -> McpResult<Option<Value>> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let bytes_read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(McpError::Io)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            if buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            // The whole line is consumed first, so a bad one is dropped alone.
            let line = std::str::from_utf8(&buf)
                .map_err(|e| McpError::ParseError(format!("Invalid UTF-8: {e}")))?;
            return parse_line(line).map(Some);
        }
    }

    async fn write_message(&self, message: &Value) -> McpResult<()> {
        let framed = frame_message(message)?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(framed.as_bytes())
            .await
            .map_err(McpError::Io)?;
        writer.flush().await.map_err(McpError::Io)
    }

    async fn close(&self) -> McpResult<()> {
        self.writer.lock().await.shutdown().await.map_err(McpError::Io)
    }
}
