//! Tool registration and dispatch.

use async_trait::async_trait;
use serde_json::Value;

use agentic_host::{
    paginate, HostError, HostResult, Page, ProgressSink, ToolProvider, DEFAULT_PAGE_SIZE,
};

use crate::types::{ToolCallResult, ToolDefinition};

use super::{countdown, echo};

pub struct BuiltinToolProvider {
    page_size: usize,
}

impl Default for BuiltinToolProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl BuiltinToolProvider {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![echo::definition(), countdown::definition()]
    }
}

#[async_trait]
impl ToolProvider for BuiltinToolProvider {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<ToolDefinition>> {
        paginate(&Self::list_tools(), cursor, self.page_size)
    }

    async fn call(
        &self,
        name: &str,
        arguments: Value,
        progress: &dyn ProgressSink,
    ) -> HostResult<ToolCallResult> {
        match name {
            "echo" => echo::execute(arguments),
            "countdown" => countdown::execute(arguments, progress).await,
            _ => Err(HostError::ToolNotFound(name.to_string())),
        }
    }
}
