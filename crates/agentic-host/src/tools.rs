//! In-memory tool provider backed by registered closures.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::pagination::{paginate, Page, DEFAULT_PAGE_SIZE};
use crate::provider::{ProgressSink, ToolProvider};
use crate::schema::{RequiredFieldsValidator, SchemaValidator};
use crate::types::{HostError, HostResult, ToolCallResult, ToolDefinition};

type ToolFn = dyn Fn(Value, &dyn ProgressSink) -> HostResult<ToolCallResult> + Send + Sync;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<ToolFn>,
}

/// Tools registered at startup, listed in registration order.
pub struct InMemoryToolProvider {
    tools: Vec<RegisteredTool>,
    validator: Box<dyn SchemaValidator>,
    page_size: usize,
}

impl Default for InMemoryToolProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryToolProvider {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            validator: Box::new(RequiredFieldsValidator),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Register a tool. A later registration with the same name replaces the earlier one.
    pub fn with_tool<F>(mut self, definition: ToolDefinition, handler: F) -> Self
    where
        F: Fn(Value, &dyn ProgressSink) -> HostResult<ToolCallResult> + Send + Sync + 'static,
    {
        self.tools.retain(|t| t.definition.name != definition.name);
        self.tools.push(RegisteredTool {
            definition,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolProvider for InMemoryToolProvider {
    fn list(&self, cursor: Option<&str>) -> HostResult<Page<ToolDefinition>> {
        let definitions: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.definition.clone()).collect();
        paginate(&definitions, cursor, self.page_size)
    }

    async fn call(
        &self,
        name: &str,
        arguments: Value,
        progress: &dyn ProgressSink,
    ) -> HostResult<ToolCallResult> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.definition.name == name)
            .ok_or_else(|| HostError::ToolNotFound(name.to_string()))?;

        self.validator
            .validate(&tool.definition.input_schema, &arguments)?;

        tracing::debug!("Calling in-memory tool {name}");
        (tool.handler)(arguments, progress)
    }
}
