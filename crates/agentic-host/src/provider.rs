//! Provider interfaces the protocol dispatcher calls into.
//!
//! Catalog providers expose a paginated `list` plus one capability-specific
//! operation. The dispatcher only calls a provider after the matching
//! capability has been negotiated for the connection.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::pagination::Page;
use crate::types::{
    CompleteRequest, Completion, ElicitRequest, ElicitResult, HostResult, PromptDefinition,
    PromptGetResult, ReadResourceResult, ResourceDefinition, ResourceTemplateDefinition,
    ToolCallResult, ToolDefinition,
};

/// Cooperative progress and cancellation handle given to long-running work.
///
/// Implementations never interrupt the caller; the operation is expected to
/// poll [`ProgressSink::cancelled`] at safe points and stop on its own.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f64, total: Option<f64>, message: Option<&str>);
    fn cancelled(&self) -> bool;
}

/// Sink for calls that carry no progress token.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: f64, _total: Option<f64>, _message: Option<&str>) {}

    fn cancelled(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<ToolDefinition>>;

    async fn call(
        &self,
        name: &str,
        arguments: Value,
        progress: &dyn ProgressSink,
    ) -> HostResult<ToolCallResult>;
}

pub trait PromptProvider: Send + Sync {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<PromptDefinition>>;

    fn get(&self, name: &str, arguments: &Map<String, Value>) -> HostResult<PromptGetResult>;
}

pub trait ResourceProvider: Send + Sync {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<ResourceDefinition>>;

    fn list_templates(&self, cursor: Option<&str>) -> HostResult<Page<ResourceTemplateDefinition>>;

    fn read(&self, uri: &str) -> HostResult<ReadResourceResult>;

    /// Whether `uri` names something this provider can serve.
    fn exists(&self, uri: &str) -> bool;
}

/// Suggests values for a prompt or resource-template argument.
///
/// An unknown reference or argument is `UnknownReference`; a request whose
/// context lacks arguments every candidate depends on is `MissingArgument`.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &CompleteRequest) -> HostResult<Completion>;
}

/// Answers `elicitation/create` on the client side.
///
/// `timeout_ms == 0` means the provider may wait for the user indefinitely.
#[async_trait]
pub trait ElicitationProvider: Send + Sync {
    async fn elicit(&self, request: ElicitRequest, timeout_ms: u64) -> HostResult<ElicitResult>;
}
