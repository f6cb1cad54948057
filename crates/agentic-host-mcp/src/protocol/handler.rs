//! Request dispatcher for one server connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use agentic_host::{
    CompletionProvider, ProgressSink, PromptProvider, ResourceProvider, ToolProvider,
};

use crate::auth::{AccessPolicy, AllowAllAccess, Principal};
use crate::config::ServerConfig;
use crate::types::*;

use super::lifecycle::{LifecycleState, ServerLifecycle};
use super::limiter::RateLimits;
use super::method::{notifications, RequestMethod};
use super::progress::{progress_token, ProgressTracker};
use super::tracker::IdentifierTracker;
use super::validator::{validate_meta, validate_request};

/// Providers backing the server capabilities. A capability without a
/// provider is never offered, whatever the configuration declares.
#[derive(Clone, Default)]
pub struct Providers {
    pub tools: Option<Arc<dyn ToolProvider>>,
    pub prompts: Option<Arc<dyn PromptProvider>>,
    pub resources: Option<Arc<dyn ResourceProvider>>,
    pub completions: Option<Arc<dyn CompletionProvider>>,
}

impl Providers {
    pub fn with_tools(mut self, tools: impl ToolProvider + 'static) -> Self {
        self.tools = Some(Arc::new(tools));
        self
    }

    pub fn with_prompts(mut self, prompts: impl PromptProvider + 'static) -> Self {
        self.prompts = Some(Arc::new(prompts));
        self
    }

    pub fn with_resources(mut self, resources: impl ResourceProvider + 'static) -> Self {
        self.resources = Some(Arc::new(resources));
        self
    }

    pub fn with_completions(mut self, completions: impl CompletionProvider + 'static) -> Self {
        self.completions = Some(Arc::new(completions));
        self
    }

    /// Capabilities these providers can serve. Logging needs no provider.
    pub fn servable(&self) -> BTreeSet<Capability> {
        let mut set = BTreeSet::from([Capability::Logging]);
        if self.tools.is_some() {
            set.insert(Capability::Tools);
        }
        if self.prompts.is_some() {
            set.insert(Capability::Prompts);
        }
        if self.resources.is_some() {
            set.insert(Capability::Resources);
        }
        if self.completions.is_some() {
            set.insert(Capability::Completions);
        }
        set
    }
}

/// The protocol handler for one connection.
pub struct ProtocolHandler {
    lifecycle: Mutex<ServerLifecycle>,
    ids: IdentifierTracker,
    progress: ProgressTracker,
    in_flight: DashMap<RequestId, ProgressToken>,
    providers: Providers,
    principal: Option<Principal>,
    access: Arc<dyn AccessPolicy>,
    limits: RateLimits,
    log_level: Mutex<Option<LogLevel>>,
    subscriptions: Mutex<BTreeSet<String>>,
    outbound: Option<mpsc::UnboundedSender<Value>>,
}

impl ProtocolHandler {
    pub fn new(config: &ServerConfig, providers: Providers) -> Self {
        let offered = config.capabilities.restricted_to(&providers.servable());
        let lifecycle = ServerLifecycle::new(
            Implementation::new(config.name.clone(), config.version.clone()),
            offered,
            config.instructions.clone(),
            config.protocol_versions.clone(),
        );

        Self {
            lifecycle: Mutex::new(lifecycle),
            ids: IdentifierTracker::new(),
            progress: ProgressTracker::new(),
            in_flight: DashMap::new(),
            providers,
            principal: None,
            access: Arc::new(AllowAllAccess),
            limits: config.rate_limits.limits(),
            log_level: Mutex::new(None),
            subscriptions: Mutex::new(BTreeSet::new()),
            outbound: None,
        }
    }

    /// Channel for server-initiated notifications (progress, log messages).
    pub fn with_outbound(mut self, outbound: mpsc::UnboundedSender<Value>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Scope checks for `tools/call` and `resources/read`. Defaults to allowing all.
    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    /// Replace the per-connection limiters, e.g. with ones shared by every session.
    pub fn with_limits(mut self, limits: RateLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn progress_tracker(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn identifier_tracker(&self) -> &IdentifierTracker {
        &self.ids
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state()
    }

    pub async fn negotiated_client(&self) -> BTreeSet<Capability> {
        self.lifecycle.lock().await.negotiated_client()
    }

    pub async fn close(&self) {
        self.lifecycle.lock().await.shutdown();
    }

    /// Handle one decoded message. `Ok(None)` means nothing to send back;
    /// `Err` means the connection must be terminated.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> McpResult<Option<Value>> {
        match msg {
            JsonRpcMessage::Request(req) => self.handle_request(req).await.map(Some),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                Ok(None)
            }
            _ => {
                tracing::warn!("Received unexpected message type from client");
                Ok(None)
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let id = request.id.clone();
        tracing::debug!("Request {id}: {}", request.method);

        if request.method == RequestMethod::Initialize.as_str() {
            return self.handle_initialize(request).await;
        }

        let ready = self.lifecycle.lock().await.check_ready(&request.method);
        let result = match ready {
            Ok(()) => self.process_request(&request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => response_value(id, value),
            Err(e) => {
                tracing::debug!("Request {id} failed: {e}");
                error_value(id, e)
            }
        }
    }

    async fn process_request(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        self.ids.register(&request.id)?;
        let result = self.process_registered(request).await;
        self.ids.release(&request.id);
        result
    }

    async fn process_registered(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        validate_request(request)?;
        let token = progress_token(request.params.as_ref())?;

        if let Some(token) = &token {
            self.progress.start(token);
            self.in_flight.insert(request.id.clone(), token.clone());
        }

        let result = self.dispatch_request(request, token.as_ref()).await;

        if let Some(token) = &token {
            self.in_flight.remove(&request.id);
            self.progress.release(token);
            self.progress.clear(token);
        }

        let value = result?;
        validate_meta(&value)
            .map_err(|e| McpError::InternalError(format!("handler produced invalid _meta: {e}")))?;
        Ok(value)
    }

    async fn dispatch_request(
        &self,
        request: &JsonRpcRequest,
        token: Option<&ProgressToken>,
    ) -> McpResult<Value> {
        let method = self.lifecycle.lock().await.check_capability(&request.method)?;
        let params = request.params.clone();

        match method {
            RequestMethod::Ping => Ok(json!({})),
            RequestMethod::Shutdown => self.handle_shutdown().await,

            RequestMethod::ToolsList => self.handle_tools_list(params).await,
            RequestMethod::ToolsCall => self.handle_tools_call(params, token).await,

            RequestMethod::PromptsList => self.handle_prompts_list(params).await,
            RequestMethod::PromptsGet => self.handle_prompts_get(params).await,

            RequestMethod::ResourcesList => self.handle_resources_list(params).await,
            RequestMethod::ResourcesTemplatesList => {
                self.handle_resource_templates_list(params).await
            }
            RequestMethod::ResourcesRead => self.handle_resources_read(params).await,
            RequestMethod::ResourcesSubscribe => self.handle_resources_subscribe(params).await,
            RequestMethod::ResourcesUnsubscribe => {
                self.handle_resources_unsubscribe(params).await
            }

            RequestMethod::LoggingSetLevel => self.handle_set_level(params).await,
            RequestMethod::CompletionComplete => self.handle_complete(params).await,

            RequestMethod::Initialize
            | RequestMethod::RootsList
            | RequestMethod::SamplingCreateMessage
            | RequestMethod::ElicitationCreate => {
                Err(McpError::MethodNotFound(request.method.clone()))
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        let method = notification.method.as_str();
        tracing::debug!("Notification: {method}");

        if method == notifications::INITIALIZED || method == notifications::INITIALIZED_ALIAS {
            let marked = self.lifecycle.lock().await.mark_initialized();
            if let Err(e) = marked {
                tracing::error!("Failed to mark initialized: {e}");
            }
            return;
        }

        if self.state().await != LifecycleState::Ready {
            tracing::warn!("Ignoring {method} before the handshake completed");
            return;
        }

        match method {
            notifications::CANCELLED => {
                match parse_params::<CancelledParams>(notification.params, "Cancel params required")
                {
                    Ok(params) => self.cancel_request(&params.request_id, params.reason.as_deref()),
                    Err(e) => tracing::error!("Invalid cancellation notification: {e}"),
                }
            }
            notifications::PROGRESS => {
                let parsed =
                    parse_params::<ProgressParams>(notification.params, "Progress params required");
                match parsed {
                    Ok(p) => self
                        .progress
                        .notify(&p.progress_token, p.progress, p.total, p.message),
                    Err(e) => tracing::error!("Invalid progress notification: {e}"),
                }
            }
            notifications::ROOTS_LIST_CHANGED => {
                tracing::info!("Client roots changed");
            }
            _ => {
                tracing::debug!("Unknown notification: {method}");
            }
        }
    }

    /// Flag the progress token of an in-flight request. Requests sent
    /// without a progress token cannot be cancelled.
    fn cancel_request(&self, id: &RequestId, reason: Option<&str>) {
        match self.in_flight.get(id) {
            Some(token) => {
                tracing::info!("Cancelling request {id}: {}", reason.unwrap_or("no reason"));
                self.progress.cancel(token.value(), reason);
            }
            None => tracing::debug!("Cancellation for request {id} with nothing to cancel"),
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let id = request.id.clone();

        let state = self.state().await;
        if state != LifecycleState::Uninitialized {
            let err = McpError::InvalidRequest(format!("initialize received while {state}"));
            return error_value(id, err);
        }

        if let Err(e) = self.ids.register(&id) {
            return error_value(id, e);
        }
        let result = self.negotiate(request.params).await;
        self.ids.release(&id);

        // A failed handshake has no negotiated contract to answer under.
        response_value(id, to_value(result?)?)
    }

    async fn negotiate(&self, params: Option<Value>) -> McpResult<InitializeResult> {
        let parsed = parse_params::<InitializeParams>(params, "Initialize params required");
        let init_params = match parsed {
            Ok(p) => p,
            Err(e) => {
                self.close().await;
                return Err(e);
            }
        };
        self.lifecycle.lock().await.initialize(init_params)
    }

    async fn handle_shutdown(&self) -> McpResult<Value> {
        tracing::info!("Shutdown requested");
        self.close().await;
        Ok(json!({}))
    }

    fn tools(&self, method: &str) -> McpResult<&Arc<dyn ToolProvider>> {
        self.providers
            .tools
            .as_ref()
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))
    }

    fn prompts(&self, method: &str) -> McpResult<&Arc<dyn PromptProvider>> {
        self.providers
            .prompts
            .as_ref()
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))
    }

    fn resources(&self, method: &str) -> McpResult<&Arc<dyn ResourceProvider>> {
        self.providers
            .resources
            .as_ref()
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))
    }

    fn completions(&self, method: &str) -> McpResult<&Arc<dyn CompletionProvider>> {
        self.providers
            .completions
            .as_ref()
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))
    }

    async fn handle_tools_list(&self, params: Option<Value>) -> McpResult<Value> {
        let page_params: PaginatedParams = parse_optional(params)?;
        let page = self
            .tools("tools/list")?
            .list(page_params.cursor.as_deref())?;
        to_value(ToolListResult {
            tools: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
        token: Option<&ProgressToken>,
    ) -> McpResult<Value> {
        let call_params: ToolCallParams = parse_params(params, "Tool call params required")?;
        self.limits.check_tool(&call_params.name)?;
        self.access
            .require_tool(self.principal.as_ref(), &call_params.name)?;
        let arguments = call_params.arguments.unwrap_or_else(|| json!({}));

        let sink = TrackedProgress {
            token,
            tracker: &self.progress,
            outbound: self.outbound.as_ref(),
        };

        let result = self
            .tools("tools/call")?
            .call(&call_params.name, arguments, &sink)
            .await;

        match result {
            Ok(result) => to_value(result),
            Err(e) => {
                let err = McpError::from(e);
                self.log(
                    LogLevel::Error,
                    "tools",
                    json!({ "tool": call_params.name, "error": err.to_string() }),
                )
                .await;
                Err(err)
            }
        }
    }

    async fn handle_prompts_list(&self, params: Option<Value>) -> McpResult<Value> {
        let page_params: PaginatedParams = parse_optional(params)?;
        let page = self
            .prompts("prompts/list")?
            .list(page_params.cursor.as_deref())?;
        to_value(PromptListResult {
            prompts: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> McpResult<Value> {
        let get_params: PromptGetParams = parse_params(params, "Prompt get params required")?;
        let arguments = get_params.arguments.unwrap_or_default();
        let result = self
            .prompts("prompts/get")?
            .get(&get_params.name, &arguments)?;
        to_value(result)
    }

    async fn handle_resources_list(&self, params: Option<Value>) -> McpResult<Value> {
        let page_params: PaginatedParams = parse_optional(params)?;
        let page = self
            .resources("resources/list")?
            .list(page_params.cursor.as_deref())?;
        to_value(ResourceListResult {
            resources: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn handle_resource_templates_list(&self, params: Option<Value>) -> McpResult<Value> {
        let page_params: PaginatedParams = parse_optional(params)?;
        let page = self
            .resources("resources/templates/list")?
            .list_templates(page_params.cursor.as_deref())?;
        to_value(ResourceTemplateListResult {
            resource_templates: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> McpResult<Value> {
        let read_params: ResourceUriParams =
            parse_params(params, "Resource read params required")?;
        self.access
            .require_resource(self.principal.as_ref(), &read_params.uri)?;
        let result = self.resources("resources/read")?.read(&read_params.uri)?;
        to_value(result)
    }

    async fn handle_resources_subscribe(&self, params: Option<Value>) -> McpResult<Value> {
        let supports_subscribe = self
            .lifecycle
            .lock()
            .await
            .server_capabilities()
            .resources
            .as_ref()
            .is_some_and(|r| r.subscribe);
        if !supports_subscribe {
            return Err(McpError::MethodNotFound("resources/subscribe".to_string()));
        }

        let sub_params: ResourceUriParams =
            parse_params(params, "Resource subscribe params required")?;
        if !self.resources("resources/subscribe")?.exists(&sub_params.uri) {
            return Err(McpError::ResourceNotFound(sub_params.uri));
        }

        self.subscriptions.lock().await.insert(sub_params.uri);
        Ok(json!({}))
    }

    async fn handle_resources_unsubscribe(&self, params: Option<Value>) -> McpResult<Value> {
        let sub_params: ResourceUriParams =
            parse_params(params, "Resource unsubscribe params required")?;
        self.subscriptions.lock().await.remove(&sub_params.uri);
        Ok(json!({}))
    }

    async fn handle_complete(&self, params: Option<Value>) -> McpResult<Value> {
        let request: CompleteRequest = parse_params(params, "Completion params required")?;
        self.limits.check_completion(&request.reference.to_string())?;
        let completion = self
            .completions("completion/complete")?
            .complete(&request)?;
        to_value(CompleteResult { completion })
    }

    async fn handle_set_level(&self, params: Option<Value>) -> McpResult<Value> {
        let level_params: SetLevelParams = parse_params(params, "Level params required")?;
        tracing::info!("Client log level set to {:?}", level_params.level);
        *self.log_level.lock().await = Some(level_params.level);
        Ok(json!({}))
    }

    pub async fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.lock().await.contains(uri)
    }

    /// Tell the client a subscribed resource changed. Unsubscribed URIs are ignored.
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<()> {
        if !self.is_subscribed(uri).await {
            return Ok(());
        }
        let params = to_value(ResourceUriParams {
            uri: uri.to_string(),
        })?;
        self.send_notification(notifications::RESOURCE_UPDATED, params);
        Ok(())
    }

    /// Emit `notifications/message` if the client asked for this level.
    pub async fn log(&self, level: LogLevel, logger: &str, data: Value) {
        let threshold = *self.log_level.lock().await;
        if !threshold.is_some_and(|min| level >= min) {
            return;
        }
        let params = LogMessageParams {
            level,
            logger: Some(logger.to_string()),
            data,
        };
        match to_value(params) {
            Ok(params) => self.send_notification(notifications::MESSAGE, params),
            Err(e) => tracing::warn!("Dropping log notification: {e}"),
        }
    }

    fn send_notification(&self, method: &str, params: Value) {
        send_notification(self.outbound.as_ref(), method, params);
    }
}

/// Progress sink for one `tools/call`: records into the tracker and forwards
/// `notifications/progress` to the client.
struct TrackedProgress<'a> {
    token: Option<&'a ProgressToken>,
    tracker: &'a ProgressTracker,
    outbound: Option<&'a mpsc::UnboundedSender<Value>>,
}

impl ProgressSink for TrackedProgress<'_> {
    fn report(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let Some(token) = self.token else {
            return;
        };
        self.tracker
            .notify(token, progress, total, message.map(str::to_string));

        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total,
            message: message.map(str::to_string),
        };
        match serde_json::to_value(params) {
            Ok(params) => send_notification(self.outbound, notifications::PROGRESS, params),
            Err(e) => tracing::warn!("Dropping progress notification: {e}"),
        }
    }

    fn cancelled(&self) -> bool {
        self.token.is_some_and(|t| self.tracker.cancelled(t))
    }
}

fn send_notification(outbound: Option<&mpsc::UnboundedSender<Value>>, method: &str, params: Value) {
    let Some(tx) = outbound else {
        return;
    };
    let notification = JsonRpcNotification::new(method, Some(params));
    match serde_json::to_value(notification) {
        Ok(value) => {
            if tx.send(value).is_err() {
                tracing::debug!("Outbound channel closed, dropping {method}");
            }
        }
        Err(e) => tracing::warn!("Failed to encode {method}: {e}"),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, missing: &str) -> McpResult<T> {
    params
        .filter(|p| !p.is_null())
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams(missing.to_string()))
}

fn parse_optional<T: DeserializeOwned + Default>(params: Option<Value>) -> McpResult<T> {
    Ok(params
        .filter(|p| !p.is_null())
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .unwrap_or_default())
}

fn to_value(value: impl serde::Serialize) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}

fn response_value(id: RequestId, result: Value) -> McpResult<Value> {
    to_value(JsonRpcResponse::new(id, result))
}

fn error_value(id: RequestId, error: McpError) -> McpResult<Value> {
    to_value(error.to_json_rpc_error(id))
}
