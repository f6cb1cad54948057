//! AgenticHost: provider library for the MCP server and client features.

pub mod completion;
pub mod elicitation;
pub mod pagination;
pub mod prompts;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod tools;
pub mod types;

pub use completion::{CompletionEntry, InMemoryCompletionProvider, MAX_COMPLETION_VALUES};
pub use elicitation::StaticElicitationProvider;
pub use pagination::{paginate, Page, DEFAULT_PAGE_SIZE};
pub use prompts::{InMemoryPromptProvider, PromptTemplate, TemplateMessage};
pub use provider::{
    CompletionProvider, ElicitationProvider, NoProgress, ProgressSink, PromptProvider,
    ResourceProvider, ToolProvider,
};
pub use resources::{InMemoryResourceProvider, StaticResource};
pub use schema::{RequiredFieldsValidator, SchemaValidator};
pub use tools::InMemoryToolProvider;
pub use types::*;
