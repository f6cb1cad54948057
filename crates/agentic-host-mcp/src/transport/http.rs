//! HTTP transport: JSON-RPC over `POST /mcp`, sessions keyed by `Mcp-Session-Id`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::auth::{AuthorizationManager, Principal};
use crate::protocol::{codec, LifecycleState, RequestMethod};
use crate::session::{HandlerFactory, SessionRegistry};
use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

pub const SESSION_HEADER: &str = "mcp-session-id";

struct HttpState {
    auth: Option<Arc<AuthorizationManager>>,
    sessions: Arc<Mutex<SessionRegistry>>,
}

/// HTTP transport for remote MCP clients.
pub struct HttpTransport {
    auth: Option<Arc<AuthorizationManager>>,
    sessions: Arc<Mutex<SessionRegistry>>,
}

impl HttpTransport {
    pub fn new(factory: HandlerFactory) -> Self {
        Self {
            auth: None,
            sessions: Arc::new(Mutex::new(SessionRegistry::new(factory))),
        }
    }

    /// Require every `/mcp` call to pass `auth`.
    pub fn with_auth(mut self, auth: AuthorizationManager) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.count()
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(HttpState {
            auth: self.auth.clone(),
            sessions: self.sessions.clone(),
        });

        Router::new()
            .route("/mcp", post(handle_post).delete(handle_delete))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(state)
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Resolve the `Authorization` header to a principal if auth is configured.
/// /health is routed outside this layer.
async fn auth_layer(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(auth) = &state.auth {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        match auth.authorize(header) {
            Ok(principal) => {
                request.extensions_mut().insert(principal);
            }
            Err(e) => {
                tracing::warn!("Rejected HTTP request: {e}");
                return rpc_error(StatusCode::UNAUTHORIZED, RequestId::Null, e);
            }
        }
    }

    next.run(request).await
}

async fn handle_post(
    State(state): State<Arc<HttpState>>,
    principal: Option<Extension<Principal>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let principal = principal.map(|Extension(p)| p);

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let err = McpError::ParseError(e.to_string());
            return rpc_error(StatusCode::BAD_REQUEST, RequestId::Null, err);
        }
    };
    let id = codec::recover_id(&value);
    let msg = match codec::decode(value) {
        Ok(msg) => msg,
        Err(e) => return rpc_error(StatusCode::BAD_REQUEST, id, e),
    };

    if is_initialize(&msg) && session_id(&headers).is_none() {
        return initialize_session(&state, principal, msg, id).await;
    }

    let Some(session) = session_id(&headers) else {
        let err = McpError::InvalidRequest(format!("missing {SESSION_HEADER} header"));
        return rpc_error(StatusCode::BAD_REQUEST, id, err);
    };
    let Some(handler) = state.sessions.lock().await.get(session) else {
        let err = McpError::InvalidRequest(format!("unknown session {session}"));
        return rpc_error(StatusCode::NOT_FOUND, id, err);
    };

    let owner = handler.principal().map(|p| p.id.as_str());
    if principal.is_some() && owner != principal.as_ref().map(|p| p.id.as_str()) {
        let err = McpError::Authorization("session belongs to another principal".to_string());
        return rpc_error(StatusCode::UNAUTHORIZED, id, err);
    }

    let is_notification = matches!(msg, JsonRpcMessage::Notification(_));
    let result = handler.handle_message(msg).await;

    if handler.state().await == LifecycleState::Closed {
        state.sessions.lock().await.remove(session).await;
    }

    match result {
        Ok(Some(reply)) => (StatusCode::OK, AxumJson(reply)).into_response(),
        Ok(None) if is_notification => StatusCode::ACCEPTED.into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => rpc_error(StatusCode::INTERNAL_SERVER_ERROR, id, e),
    }
}

async fn initialize_session(
    state: &HttpState,
    principal: Option<Principal>,
    msg: JsonRpcMessage,
    id: RequestId,
) -> Response {
    let (session, handler) = state.sessions.lock().await.create(principal);

    match handler.handle_message(msg).await {
        Ok(Some(reply)) => (
            StatusCode::OK,
            [(SESSION_HEADER, session)],
            AxumJson(reply),
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            // The handshake failed, so the session never existed.
            state.sessions.lock().await.remove(&session).await;
            rpc_error(StatusCode::BAD_REQUEST, id, e)
        }
    }
}

async fn handle_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> StatusCode {
    let Some(session) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.sessions.lock().await.remove(session).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Health check endpoint, no auth required.
async fn handle_health(State(state): State<Arc<HttpState>>) -> AxumJson<Value> {
    let sessions = state.sessions.lock().await.count();
    AxumJson(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": sessions,
    }))
}

fn is_initialize(msg: &JsonRpcMessage) -> bool {
    msg.method() == Some(RequestMethod::Initialize.as_str())
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn rpc_error(status: StatusCode, id: RequestId, error: McpError) -> Response {
    (status, AxumJson(error.to_json_rpc_error(id))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BearerTokenStrategy, StaticTokenResolver};
    use crate::config::ServerConfig;
    use crate::protocol::{ProtocolHandler, Providers};
    use crate::tools::BuiltinToolProvider;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn transport() -> HttpTransport {
        HttpTransport::new(Arc::new(|| {
            ProtocolHandler::new(
                &ServerConfig::default(),
                Providers::default().with_tools(BuiltinToolProvider::default()),
            )
        }))
    }

    fn post(body: Value, session: Option<&str>, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn initialize() -> Value {
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "web", "version": "1" }
            }
        })
    }

    #[tokio::test]
    async fn test_session_flow() {
        let transport = transport();
        let app = transport.router();

        let resp = app.clone().oneshot(post(initialize(), None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let session = resp.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(post(
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
                Some(&session),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = app
            .clone()
            .oneshot(post(
                json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
                Some(&session),
                None,
            ))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["id"], 2);
        assert!(body["result"]["tools"].is_array());

        let delete = HttpRequest::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(delete).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(transport.session_count().await, 0);

        let resp = app
            .oneshot(post(
                json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }),
                Some(&session),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_auth_required_except_health() {
        let resolver = StaticTokenResolver::new()
            .with_token("good", Principal::new("alice", Vec::<String>::new()));
        let transport = transport()
            .with_auth(
                AuthorizationManager::new().with_strategy(BearerTokenStrategy::new(resolver)),
            );
        let app = transport.router();

        let resp = app.clone().oneshot(post(initialize(), None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"]["code"], -32900);

        let resp = app
            .clone()
            .oneshot(post(initialize(), None, Some("bad")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(post(initialize(), None, Some("good")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let health = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(health).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["sessions"], 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let app = transport().router();
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/mcp")
            .body(Body::from("{ nope"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_failed_handshake_discards_session() {
        let transport = transport();
        let mut init = initialize();
        init["params"]["protocolVersion"] = json!("1999-01-01");
        let resp = transport.router().oneshot(post(init, None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().get(SESSION_HEADER).is_none());
        assert_eq!(transport.session_count().await, 0);
    }
}
