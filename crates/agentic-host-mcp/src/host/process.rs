//! Registration table of connected clients.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::protocol::check_server_capability;
use crate::types::{Capability, Implementation, McpError, McpResult};

use super::client::McpClient;
use super::policy::{AllowAllPolicy, SecurityPolicy};

struct ClientSession {
    id: String,
    client: Arc<dyn McpClient>,
    connected_at: DateTime<Utc>,
}

/// Snapshot of one registered session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub client: Implementation,
    pub capabilities: BTreeSet<Capability>,
    pub connected_at: DateTime<Utc>,
}

/// Owns every client session of one host.
///
/// The table lock is held for the whole of `register`, `unregister` and
/// `aggregate_context`, so none of them observe a half-registered session.
pub struct HostProcess {
    policy: Box<dyn SecurityPolicy>,
    sessions: Mutex<Vec<ClientSession>>,
}

impl Default for HostProcess {
    fn default() -> Self {
        Self::new(AllowAllPolicy)
    }
}

impl HostProcess {
    pub fn new(policy: impl SecurityPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Admit, connect and record `client` under `id`.
    ///
    /// A rejected client is never connected. An id that is already
    /// registered must be unregistered first.
    pub async fn register(&self, id: &str, client: Arc<dyn McpClient>) -> McpResult<()> {
        let mut sessions = self.sessions.lock().await;

        let info = client.info();
        if !self.policy.allow(&info) {
            tracing::warn!("Security policy rejected client {} for session {id}", info.name);
            return Err(McpError::Security(format!(
                "client '{}' rejected by security policy",
                info.name
            )));
        }

        if sessions.iter().any(|s| s.id == id) {
            return Err(McpError::InvalidRequest(format!(
                "session '{id}' is already registered"
            )));
        }

        client.connect().await?;

        sessions.push(ClientSession {
            id: id.to_string(),
            client,
            connected_at: Utc::now(),
        });
        tracing::info!("Registered session {id} ({} v{})", info.name, info.version);
        Ok(())
    }

    /// Disconnect and forget `id`. Unknown ids are ignored.
    pub async fn unregister(&self, id: &str) -> McpResult<()> {
        let mut sessions = self.sessions.lock().await;
        let Some(pos) = sessions.iter().position(|s| s.id == id) else {
            return Ok(());
        };
        let session = sessions.remove(pos);
        tracing::info!("Unregistered session {id}");
        session.client.disconnect().await
    }

    /// Registered ids in registration order.
    pub async fn client_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Contexts of the registered clients in registration order, empty
    /// ones skipped, joined by newlines.
    pub async fn aggregate_context(&self) -> String {
        let sessions = self.sessions.lock().await;
        let mut parts = Vec::with_capacity(sessions.len());
        for session in sessions.iter() {
            let context = session.client.context().await;
            if !context.is_empty() {
                parts.push(context);
            }
        }
        parts.join("\n")
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions.iter() {
            infos.push(SessionInfo {
                id: session.id.clone(),
                client: session.client.info(),
                capabilities: session.client.server_capabilities().await,
                connected_at: session.connected_at,
            });
        }
        infos
    }

    async fn client(&self, id: &str) -> McpResult<Arc<dyn McpClient>> {
        self.sessions
            .lock()
            .await
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.client.clone())
            .ok_or_else(|| McpError::InvalidRequest(format!("unknown session '{id}'")))
    }

    /// Forward a request to the server behind `id`.
    pub async fn request(&self, id: &str, method: &str, params: Option<Value>) -> McpResult<Value> {
        let client = self.client(id).await?;
        check_server_capability(method, &client.server_capabilities().await)?;
        client.request(method, params).await
    }

    pub async fn notify(&self, id: &str, method: &str, params: Option<Value>) -> McpResult<()> {
        self.client(id).await?.notify(method, params).await
    }

    /// Unregister every session. Disconnect failures are logged.
    pub async fn close(&self) {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.drain(..) {
            if let Err(e) = session.client.disconnect().await {
                tracing::warn!("Failed to disconnect session {}: {e}", session.id);
            }
        }
        tracing::info!("Host closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::AllowListPolicy;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeClient {
        name: String,
        context: String,
        capabilities: BTreeSet<Capability>,
        connects: AtomicUsize,
        connected: AtomicBool,
        fail_connect: bool,
    }

    impl FakeClient {
        fn new(name: &str, context: &str) -> Self {
            Self {
                name: name.to_string(),
                context: context.to_string(),
                capabilities: BTreeSet::from([Capability::Prompts]),
                connects: AtomicUsize::new(0),
                connected: AtomicBool::new(false),
                fail_connect: false,
            }
        }
    }

    #[async_trait]
    impl McpClient for FakeClient {
        fn info(&self) -> Implementation {
            Implementation::new(self.name.clone(), "1.0")
        }

        async fn connect(&self) -> McpResult<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            // Give other tasks a chance to run mid-handshake.
            tokio::task::yield_now().await;
            if self.fail_connect {
                return Err(McpError::Transport("refused".to_string()));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> McpResult<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn context(&self) -> String {
            if self.connected.load(Ordering::SeqCst) {
                self.context.clone()
            } else {
                format!("unconnected:{}", self.name)
            }
        }

        async fn server_capabilities(&self) -> BTreeSet<Capability> {
            self.capabilities.clone()
        }

        async fn request(&self, method: &str, _params: Option<Value>) -> McpResult<Value> {
            Ok(json!({ "method": method }))
        }

        async fn notify(&self, _method: &str, _params: Option<Value>) -> McpResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rejected_client_never_connects() {
        let host = HostProcess::new(AllowListPolicy::new(["good"]));
        let bad = Arc::new(FakeClient::new("bad", "x"));

        let err = host.register("b", bad.clone()).await.unwrap_err();
        assert!(matches!(err, McpError::Security(_)));
        assert_eq!(bad.connects.load(Ordering::SeqCst), 0);
        assert!(host.client_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_connect_records_nothing() {
        let host = HostProcess::default();
        let mut client = FakeClient::new("a", "x");
        client.fail_connect = true;
        assert!(host.register("a", Arc::new(client)).await.is_err());
        assert!(host.client_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_existing_session() {
        let host = HostProcess::default();
        let first = Arc::new(FakeClient::new("a", "first"));
        let second = Arc::new(FakeClient::new("a", "second"));

        host.register("a", first.clone()).await.unwrap();
        let err = host.register("a", second.clone()).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
        assert_eq!(second.connects.load(Ordering::SeqCst), 0);
        assert!(first.connected.load(Ordering::SeqCst));
        assert_eq!(host.aggregate_context().await, "first");

        host.unregister("a").await.unwrap();
        host.register("a", second).await.unwrap();
        assert_eq!(host.aggregate_context().await, "second");
    }

    #[tokio::test]
    async fn test_aggregate_context_order_and_removal() {
        let host = HostProcess::default();
        host.register("one", Arc::new(FakeClient::new("a", "alpha")))
            .await
            .unwrap();
        host.register("two", Arc::new(FakeClient::new("b", "")))
            .await
            .unwrap();
        host.register("three", Arc::new(FakeClient::new("c", "gamma")))
            .await
            .unwrap();

        assert_eq!(host.aggregate_context().await, "alpha\ngamma");
        assert_eq!(host.client_ids().await, vec!["one", "two", "three"]);

        host.unregister("one").await.unwrap();
        host.unregister("missing").await.unwrap();
        assert_eq!(host.aggregate_context().await, "gamma");
    }

    #[tokio::test]
    async fn test_request_gated_on_server_capabilities() {
        let host = HostProcess::default();
        host.register("a", Arc::new(FakeClient::new("a", "")))
            .await
            .unwrap();

        let ok = host.request("a", "prompts/list", None).await.unwrap();
        assert_eq!(ok["method"], "prompts/list");
        assert!(matches!(
            host.request("a", "tools/list", None).await,
            Err(McpError::MethodNotFound(_))
        ));
        assert!(matches!(
            host.request("nope", "ping", None).await,
            Err(McpError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_close_disconnects_all() {
        let host = HostProcess::default();
        let client = Arc::new(FakeClient::new("a", ""));
        host.register("a", client.clone()).await.unwrap();
        assert_eq!(host.sessions().await.len(), 1);
        host.close().await;
        assert!(!client.connected.load(Ordering::SeqCst));
        assert!(host.client_ids().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister_and_aggregate() {
        let host = Arc::new(HostProcess::default());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let host = host.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("c{i}");
                let client = Arc::new(FakeClient::new(&id, &format!("ctx-{id}")));
                host.register(&id, client).await
            }));
        }
        for i in 0..10 {
            let host = host.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("c{i}");
                while !host.client_ids().await.contains(&id) {
                    tokio::task::yield_now().await;
                }
                host.unregister(&id).await
            }));
        }

        let racers: Vec<Arc<FakeClient>> = (0..8)
            .map(|i| Arc::new(FakeClient::new("shared", &format!("ctx-shared-{i}"))))
            .collect();
        let shared: Vec<_> = racers
            .iter()
            .cloned()
            .map(|client| {
                let host = host.clone();
                tokio::spawn(async move { host.register("shared", client).await })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let host = host.clone();
                tokio::spawn(async move {
                    let mut snapshots = Vec::new();
                    for _ in 0..50 {
                        snapshots.push(host.aggregate_context().await);
                        tokio::task::yield_now().await;
                    }
                    snapshots
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut winners = 0;
        for task in shared {
            match task.await.unwrap() {
                Ok(()) => winners += 1,
                Err(e) => assert!(matches!(e, McpError::InvalidRequest(_)), "{e}"),
            }
        }
        assert_eq!(winners, 1);
        let connected = racers
            .iter()
            .filter(|c| c.connects.load(Ordering::SeqCst) > 0)
            .count();
        assert_eq!(connected, 1, "losing registrations must not connect");

        for reader in readers {
            for snapshot in reader.await.unwrap() {
                if snapshot.is_empty() {
                    continue;
                }
                let parts: Vec<&str> = snapshot.split('\n').collect();
                let unique: BTreeSet<&str> = parts.iter().copied().collect();
                assert_eq!(unique.len(), parts.len(), "duplicate context in {snapshot:?}");
                assert!(parts.iter().all(|p| p.starts_with("ctx-")), "{snapshot:?}");
                let shared_parts = parts.iter().filter(|p| p.starts_with("ctx-shared-")).count();
                assert!(shared_parts <= 1, "{snapshot:?}");
            }
        }

        let ids: BTreeSet<String> = host.client_ids().await.into_iter().collect();
        let mut expected: BTreeSet<String> = (10..20).map(|i| format!("c{i}")).collect();
        expected.insert("shared".to_string());
        assert_eq!(ids, expected);
        assert_eq!(host.aggregate_context().await.split('\n').count(), 11);
    }
}
