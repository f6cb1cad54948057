//! Host-side connection to one MCP server.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use agentic_host::ElicitationProvider;

use crate::host::McpClient;
use crate::protocol::method::notifications;
use crate::protocol::{
    check_server_capability, codec, negotiate_version, IdentifierTracker, LifecycleState,
    ProgressTracker, RequestMethod,
};
use crate::transport::Transport;
use crate::types::*;

/// How a connection presents itself and what it answers on the client side.
#[derive(Clone)]
pub struct ClientOptions {
    /// Identity sent in `initialize` and shown to the host's security policy.
    pub info: Implementation,
    pub capabilities: ClientCapabilities,
    /// Newest first. The first entry is the one requested.
    pub protocol_versions: Vec<String>,
    pub roots: Vec<Root>,
    pub elicitation: Option<Arc<dyn ElicitationProvider>>,
    /// Zero waits forever.
    pub request_timeout_ms: u64,
    /// Zero lets the elicitation provider wait forever.
    pub elicitation_timeout_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            info: Implementation::new("agentic-host", SERVER_VERSION),
            capabilities: ClientCapabilities::default(),
            protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            roots: Vec::new(),
            elicitation: None,
            request_timeout_ms: 30_000,
            elicitation_timeout_ms: 0,
        }
    }
}

impl ClientOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            info: Implementation::new(name, SERVER_VERSION),
            ..Self::default()
        }
    }

    /// Expose `roots` and declare the roots capability.
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = roots;
        self.capabilities.roots = Some(RootsCapability::default());
        self
    }

    /// Answer `elicitation/create` with `provider` and declare the capability.
    pub fn with_elicitation(mut self, provider: impl ElicitationProvider + 'static) -> Self {
        self.elicitation = Some(Arc::new(provider));
        self.capabilities.elicitation = Some(ElicitationCapability::default());
        self
    }

    pub fn with_request_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_elicitation_timeout(mut self, timeout_ms: u64) -> Self {
        self.elicitation_timeout_ms = timeout_ms;
        self
    }
}

type PendingReply = oneshot::Sender<McpResult<Value>>;

struct Inner {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    state: Mutex<LifecycleState>,
    negotiated: Mutex<Option<InitializeResult>>,
    ids: IdentifierTracker,
    next_id: AtomicI64,
    pending: DashMap<RequestId, PendingReply>,
    progress: ProgressTracker,
}

/// A client connection: handshake, correlated requests, and answers to
/// server-initiated requests.
pub struct ClientConnection {
    inner: Arc<Inner>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ClientConnection {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                options,
                state: Mutex::new(LifecycleState::Uninitialized),
                negotiated: Mutex::new(None),
                ids: IdentifierTracker::new(),
                next_id: AtomicI64::new(1),
                pending: DashMap::new(),
                progress: ProgressTracker::new(),
            }),
            reader: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.inner.state.lock().await
    }

    pub async fn server_info(&self) -> Option<Implementation> {
        self.inner
            .negotiated
            .lock()
            .await
            .as_ref()
            .map(|r| r.server_info.clone())
    }

    pub async fn protocol_version(&self) -> Option<String> {
        self.inner
            .negotiated
            .lock()
            .await
            .as_ref()
            .map(|r| r.protocol_version.clone())
    }

    /// Progress the server reported for requests sent with a progress token.
    pub fn progress_tracker(&self) -> &ProgressTracker {
        &self.inner.progress
    }

    /// Send a request and wait for its reply. A zero timeout waits forever;
    /// an elapsed one cancels the request on the server.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> McpResult<Value> {
        self.inner.check_ready(method).await?;
        check_server_capability(method, &self.negotiated_capabilities().await)?;
        self.inner.call(method, params, timeout_ms).await
    }

    async fn negotiated_capabilities(&self) -> BTreeSet<Capability> {
        self.inner
            .negotiated
            .lock()
            .await
            .as_ref()
            .map(|r| r.capabilities.declared())
            .unwrap_or_default()
    }

    async fn handshake(&self) -> McpResult<()> {
        let options = &self.inner.options;
        let requested = options
            .protocol_versions
            .first()
            .cloned()
            .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string());

        let params = InitializeParams {
            protocol_version: requested,
            capabilities: options.capabilities.clone(),
            client_info: options.info.clone(),
        };
        let params = serde_json::to_value(params)?;

        let reply = self
            .inner
            .call(
                RequestMethod::Initialize.as_str(),
                Some(params),
                options.request_timeout_ms,
            )
            .await?;
        let result: InitializeResult = serde_json::from_value(reply)
            .map_err(|e| McpError::InvalidParams(format!("malformed initialize result: {e}")))?;
        negotiate_version(&result.protocol_version, &options.protocol_versions)?;

        tracing::info!(
            "Connected to {} v{} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );
        *self.inner.negotiated.lock().await = Some(result);

        self.inner.send(&JsonRpcNotification::new(notifications::INITIALIZED, None)).await?;
        *self.inner.state.lock().await = LifecycleState::Ready;
        Ok(())
    }

    async fn teardown(&self) -> McpResult<()> {
        *self.inner.state.lock().await = LifecycleState::Closed;
        let closed = self.inner.transport.close().await;
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.inner.fail_pending();
        closed
    }
}

impl Inner {
    async fn check_ready(&self, method: &str) -> McpResult<()> {
        match *self.state.lock().await {
            LifecycleState::Ready => Ok(()),
            state => Err(McpError::InvalidRequest(format!(
                "connection is {state}, cannot send {method}"
            ))),
        }
    }

    async fn send(&self, message: &impl Serialize) -> McpResult<()> {
        let value = serde_json::to_value(message)?;
        self.transport.write_message(&value).await
    }

    async fn call(&self, method: &str, params: Option<Value>, timeout_ms: u64) -> McpResult<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.ids.register(&id)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        if let Err(e) = self.send(&JsonRpcRequest::new(id.clone(), method, params)).await {
            self.pending.remove(&id);
            self.ids.release(&id);
            return Err(e);
        }

        let outcome = if timeout_ms == 0 {
            Ok(rx.await)
        } else {
            tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await
        };

        self.pending.remove(&id);
        self.ids.release(&id);

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(McpError::Transport(format!(
                "connection closed before {method} completed"
            ))),
            Err(_) => {
                tracing::warn!("{method} ({id}) timed out after {timeout_ms}ms");
                let cancel = CancelledParams {
                    request_id: id,
                    reason: Some(format!("timed out after {timeout_ms}ms")),
                };
                let notification = JsonRpcNotification::new(
                    notifications::CANCELLED,
                    Some(serde_json::to_value(cancel)?),
                );
                if let Err(e) = self.send(&notification).await {
                    tracing::debug!("Could not send cancellation: {e}");
                }
                Err(McpError::Timeout(timeout_ms))
            }
        }
    }

    fn complete(&self, id: &RequestId, reply: McpResult<Value>) {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                // The caller may have timed out in the meantime.
                let _ = tx.send(reply);
            }
            None => tracing::warn!("Reply for unknown request {id}"),
        }
    }

    fn fail_pending(&self) {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(McpError::Transport("connection closed".to_string())));
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, value: Value) {
        let msg = match codec::decode(value) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Dropping malformed message from server: {e}");
                return;
            }
        };

        match msg {
            JsonRpcMessage::Response(resp) => self.complete(&resp.id, Ok(resp.result)),
            JsonRpcMessage::Error(err) => {
                self.complete(&err.id, Err(McpError::from_error_object(&err.error)))
            }
            JsonRpcMessage::Request(req) => {
                let inner = self.clone();
                tokio::spawn(async move {
                    let reply = inner.answer(req).await;
                    if let Err(e) = inner.transport.write_message(&reply).await {
                        tracing::warn!("Failed to answer server request: {e}");
                    }
                });
            }
            JsonRpcMessage::Notification(notif) => self.observe(notif),
        }
    }

    fn observe(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            notifications::PROGRESS => {
                let parsed = notification
                    .params
                    .map(serde_json::from_value::<ProgressParams>)
                    .transpose();
                match parsed {
                    Ok(Some(p)) => self
                        .progress
                        .notify(&p.progress_token, p.progress, p.total, p.message),
                    Ok(None) => tracing::error!("Progress notification without params"),
                    Err(e) => tracing::error!("Invalid progress notification: {e}"),
                }
            }
            notifications::MESSAGE => {
                tracing::info!("Server log: {}", notification.params.unwrap_or_default());
            }
            other => tracing::debug!("Server notification: {other}"),
        }
    }

    /// Answer a server-initiated request. Always produces a reply document.
    async fn answer(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let declared = self.options.capabilities.declared();

        let result = match RequestMethod::from_method(&request.method) {
            Some(RequestMethod::Ping) => Ok(json!({})),
            Some(RequestMethod::RootsList) if declared.contains(&Capability::Roots) => {
                serde_json::to_value(ListRootsResult {
                    roots: self.options.roots.clone(),
                })
                .map_err(McpError::from)
            }
            Some(RequestMethod::ElicitationCreate)
                if declared.contains(&Capability::Elicitation) =>
            {
                self.elicit(request.params).await
            }
            _ => Err(McpError::MethodNotFound(request.method.clone())),
        };

        let reply = match result {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id.clone(), value)),
            Err(e) => {
                tracing::debug!("Server request {} failed: {e}", request.method);
                serde_json::to_value(e.to_json_rpc_error(id.clone()))
            }
        };
        reply.unwrap_or_else(|e| {
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": { "code": error_codes::INTERNAL_ERROR, "message": e.to_string() }
            })
        })
    }

    async fn elicit(&self, params: Option<Value>) -> McpResult<Value> {
        let provider = self
            .options
            .elicitation
            .as_ref()
            .ok_or_else(|| McpError::MethodNotFound("elicitation/create".to_string()))?;

        let request: ElicitRequest = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Elicitation params required".to_string()))?;

        let timeout_ms = self.options.elicitation_timeout_ms;
        let result = if timeout_ms == 0 {
            provider.elicit(request, 0).await?
        } else {
            tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                provider.elicit(request, timeout_ms),
            )
            .await
            .map_err(|_| McpError::Timeout(timeout_ms))??
        };

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }
}

async fn read_loop(inner: Arc<Inner>) {
    loop {
        match inner.transport.read_message().await {
            Ok(Some(value)) => inner.dispatch(value).await,
            Ok(None) => {
                tracing::info!("Server closed the connection");
                break;
            }
            Err(e @ McpError::ParseError(_)) => {
                tracing::warn!("Unparseable message from server: {e}")
            }
            Err(e) => {
                tracing::error!("Read failed: {e}");
                break;
            }
        }
    }
    *inner.state.lock().await = LifecycleState::Closed;
    inner.fail_pending();
}

#[async_trait]
impl McpClient for ClientConnection {
    fn info(&self) -> Implementation {
        self.inner.options.info.clone()
    }

    async fn connect(&self) -> McpResult<()> {
        {
            let mut state = self.inner.state.lock().await;
            if *state != LifecycleState::Uninitialized {
                return Err(McpError::InvalidRequest(format!(
                    "cannot connect while {}",
                    *state
                )));
            }
            *state = LifecycleState::Negotiating;
        }

        *self.reader.lock().await = Some(tokio::spawn(read_loop(self.inner.clone())));

        if let Err(e) = self.handshake().await {
            tracing::error!("Handshake failed: {e}");
            if let Err(close_err) = self.teardown().await {
                tracing::debug!("Close after failed handshake: {close_err}");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn disconnect(&self) -> McpResult<()> {
        if self.state().await == LifecycleState::Ready {
            let timeout = self.inner.options.request_timeout_ms;
            if let Err(e) = self.inner.call(RequestMethod::Shutdown.as_str(), None, timeout).await {
                tracing::debug!("Server did not acknowledge shutdown: {e}");
            }
        }
        self.teardown().await
    }

    async fn context(&self) -> String {
        self.inner
            .negotiated
            .lock()
            .await
            .as_ref()
            .and_then(|r| r.instructions.clone())
            .unwrap_or_default()
    }

    async fn server_capabilities(&self) -> BTreeSet<Capability> {
        self.negotiated_capabilities().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let timeout = self.inner.options.request_timeout_ms;
        self.request_with_timeout(method, params, timeout).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.inner.check_ready(method).await?;
        self.inner.send(&JsonRpcNotification::new(method, params)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    /// Answer the handshake the way a minimal server would.
    async fn fake_server(server: ChannelTransport, version: &'static str) {
        let init = server.read_message().await.unwrap().unwrap();
        assert_eq!(init["method"], "initialize");
        server
            .write_message(&json!({
                "jsonrpc": "2.0",
                "id": init["id"],
                "result": {
                    "protocolVersion": version,
                    "capabilities": { "prompts": {} },
                    "serverInfo": { "name": "fake", "version": "0.0.1" },
                    "instructions": "use prompts"
                }
            }))
            .await
            .unwrap();
        let initialized = server.read_message().await.unwrap().unwrap();
        assert_eq!(initialized["method"], "notifications/initialized");

        // Ask the client something it did not declare, then idle until closed.
        server
            .write_message(&json!({ "jsonrpc": "2.0", "id": "s1", "method": "roots/list" }))
            .await
            .unwrap();
        let reply = server.read_message().await.unwrap().unwrap();
        assert_eq!(reply["id"], "s1");
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);

        while server.read_message().await.unwrap().is_some() {}
    }

    #[tokio::test]
    async fn test_handshake_and_context() {
        let (client_end, server_end) = ChannelTransport::pair();
        let server = tokio::spawn(fake_server(server_end, "2025-06-18"));

        let conn = ClientConnection::new(Arc::new(client_end), ClientOptions::default());
        conn.connect().await.unwrap();

        assert_eq!(conn.state().await, LifecycleState::Ready);
        assert_eq!(conn.context().await, "use prompts");
        assert_eq!(
            conn.server_capabilities().await,
            BTreeSet::from([Capability::Prompts])
        );
        assert!(matches!(
            conn.request("tools/list", None).await,
            Err(McpError::MethodNotFound(_))
        ));

        conn.teardown().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_server_version_fails_connect() {
        let (client_end, server_end) = ChannelTransport::pair();
        tokio::spawn(async move {
            let init = server_end.read_message().await.unwrap().unwrap();
            server_end
                .write_message(&json!({
                    "jsonrpc": "2.0",
                    "id": init["id"],
                    "result": {
                        "protocolVersion": "1999-01-01",
                        "capabilities": {},
                        "serverInfo": { "name": "old", "version": "0" }
                    }
                }))
                .await
                .unwrap();
        });

        let conn = ClientConnection::new(Arc::new(client_end), ClientOptions::default());
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, McpError::UnsupportedProtocolVersion(_)));
        assert_eq!(conn.state().await, LifecycleState::Closed);
    }

    #[tokio::test]
    async fn test_request_timeout_sends_cancellation() {
        let (client_end, server_end) = ChannelTransport::pair();
        let conn = ClientConnection::new(
            Arc::new(client_end),
            ClientOptions::default().with_request_timeout(50),
        );
        let err = conn.inner.call("slow", None, 20).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout(20)));

        let request = server_end.read_message().await.unwrap().unwrap();
        let cancel = server_end.read_message().await.unwrap().unwrap();
        assert_eq!(cancel["method"], "notifications/cancelled");
        assert_eq!(cancel["params"]["requestId"], request["id"]);
        assert!(conn.inner.ids.is_empty());
    }

    #[tokio::test]
    async fn test_requests_refused_before_ready() {
        let (client_end, _server_end) = ChannelTransport::pair();
        let conn = ClientConnection::new(Arc::new(client_end), ClientOptions::default());
        assert!(matches!(
            conn.request("ping", None).await,
            Err(McpError::InvalidRequest(_))
        ));
    }
}
