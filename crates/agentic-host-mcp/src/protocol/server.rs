//! Connection loop: read from a transport, dispatch, write replies.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::transport::Transport;
use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

use super::codec;
use super::handler::ProtocolHandler;
use super::lifecycle::LifecycleState;
use super::method::RequestMethod;

/// Serve one connection until the peer disconnects, sends `shutdown`, or
/// fails the handshake.
///
/// Lifecycle traffic and notifications are handled in arrival order. Every
/// other request runs on its own task so a slow tool does not block
/// cancellation or further requests. All output goes through one writer task.
pub async fn serve_connection(
    handler: ProtocolHandler,
    transport: Arc<dyn Transport>,
) -> McpResult<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(handler.with_outbound(tx.clone()));
    let writer = tokio::spawn(write_loop(transport.clone(), rx));

    tracing::info!("Connection opened");
    let result = read_loop(&handler, transport.as_ref(), &tx).await;

    // The writer drains until every clone of the sender is gone, including
    // the ones held by requests still in flight.
    drop(handler);
    drop(tx);
    if let Err(e) = writer.await {
        tracing::error!("Writer task failed: {e}");
    }

    if let Err(e) = transport.close().await {
        tracing::warn!("Failed to close transport: {e}");
    }
    tracing::info!("Connection closed");
    result
}

async fn read_loop(
    handler: &Arc<ProtocolHandler>,
    transport: &dyn Transport,
    tx: &mpsc::UnboundedSender<Value>,
) -> McpResult<()> {
    loop {
        let value = match transport.read_message().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::info!("Peer disconnected");
                return Ok(());
            }
            Err(e @ McpError::ParseError(_)) => {
                tracing::warn!("Parse error: {e}");
                send(tx, error_reply(RequestId::Null, e));
                continue;
            }
            Err(e) => return Err(e),
        };

        let id = codec::recover_id(&value);
        let msg = match codec::decode(value) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Rejected message: {e}");
                send(tx, error_reply(id, e));
                continue;
            }
        };

        if runs_concurrently(&msg) {
            let handler = handler.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                match handler.handle_message(msg).await {
                    Ok(Some(reply)) => send(&tx, Ok(reply)),
                    Ok(None) => {}
                    Err(e) => tracing::error!("Request failed without a reply: {e}"),
                }
            });
            continue;
        }

        match handler.handle_message(msg).await {
            Ok(Some(reply)) => send(tx, Ok(reply)),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Terminating connection: {e}");
                return Err(e);
            }
        }

        if handler.state().await == LifecycleState::Closed {
            return Ok(());
        }
    }
}

fn runs_concurrently(msg: &JsonRpcMessage) -> bool {
    match msg {
        JsonRpcMessage::Request(req) => !matches!(
            RequestMethod::from_method(&req.method),
            Some(RequestMethod::Initialize | RequestMethod::Shutdown)
        ),
        _ => false,
    }
}

async fn write_loop(transport: Arc<dyn Transport>, mut rx: mpsc::UnboundedReceiver<Value>) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = transport.write_message(&message).await {
            tracing::error!("Write failed, dropping remaining output: {e}");
            break;
        }
    }
}

fn error_reply(id: RequestId, error: McpError) -> McpResult<Value> {
    serde_json::to_value(error.to_json_rpc_error(id))
        .map_err(|e| McpError::InternalError(e.to_string()))
}

fn send(tx: &mpsc::UnboundedSender<Value>, reply: McpResult<Value>) {
    match reply {
        Ok(value) => {
            if tx.send(value).is_err() {
                tracing::debug!("Writer gone, dropping reply");
            }
        }
        Err(e) => tracing::error!("Failed to encode reply: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::protocol::Providers;
    use crate::tools::BuiltinToolProvider;
    use crate::transport::ChannelTransport;
    use serde_json::json;

    fn spawn_server() -> (tokio::task::JoinHandle<McpResult<()>>, ChannelTransport) {
        let (client, server) = ChannelTransport::pair();
        let handler = ProtocolHandler::new(
            &ServerConfig::default(),
            Providers::default().with_tools(BuiltinToolProvider::default()),
        );
        let task = tokio::spawn(serve_connection(handler, Arc::new(server)));
        (task, client)
    }

    #[tokio::test]
    async fn test_parse_error_gets_null_id() {
        let (task, client) = spawn_server();
        client
            .write_message(&json!({ "jsonrpc": "2.0", "id": true, "method": "ping" }))
            .await
            .unwrap();
        let reply = client.read_message().await.unwrap().unwrap();
        assert_eq!(reply["error"]["code"], -32700);
        assert_eq!(reply["id"], Value::Null);

        client.close().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_bytes_keep_connection_open() {
        use crate::transport::FramedTransport;
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let transport = FramedTransport::new(BufReader::new(server_read), server_write);
        let handler = ProtocolHandler::new(&ServerConfig::default(), Providers::default());
        let task = tokio::spawn(serve_connection(handler, Arc::new(transport)));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"p\xff\"}\n")
            .await
            .unwrap();
        let init = json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "t", "version": "1" }
            }
        });
        client_write
            .write_all(format!("{init}\n").as_bytes())
            .await
            .unwrap();

        let first: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["error"]["code"], -32700);
        assert_eq!(first["id"], Value::Null);

        let second: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["id"], 1);
        assert_eq!(second["result"]["protocolVersion"], "2025-06-18");

        client_write.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_handshake_terminates_silently() {
        let (task, client) = spawn_server();
        client
            .write_message(&json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "1999-01-01",
                    "capabilities": {},
                    "clientInfo": { "name": "t", "version": "1" }
                }
            }))
            .await
            .unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(client.read_message().await.unwrap().is_none());
    }
}
