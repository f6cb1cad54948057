//! In-memory transport connecting two endpoints in the same process.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::types::{McpError, McpResult};

use super::Transport;

pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl ChannelTransport {
    /// Two connected endpoints. Closing one ends the other's stream.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(a_tx)),
                rx: Mutex::new(a_rx),
            },
            Self {
                tx: Mutex::new(Some(b_tx)),
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn read_message(&self) -> McpResult<Option<Value>> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn write_message(&self, message: &Value) -> McpResult<()> {
        let tx = self.tx.lock().await;
        let tx = tx
            .as_ref()
            .ok_or_else(|| McpError::Transport("channel closed".to_string()))?;
        tx.send(message.clone())
            .map_err(|_| McpError::Transport("peer hung up".to_string()))
    }

    async fn close(&self) -> McpResult<()> {
        self.tx.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (a, b) = ChannelTransport::pair();
        a.write_message(&json!(1)).await.unwrap();
        b.write_message(&json!(2)).await.unwrap();
        assert_eq!(b.read_message().await.unwrap(), Some(json!(1)));
        assert_eq!(a.read_message().await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (a, b) = ChannelTransport::pair();
        a.close().await.unwrap();
        assert_eq!(b.read_message().await.unwrap(), None);
        assert!(a.write_message(&json!(1)).await.is_err());
    }
}
