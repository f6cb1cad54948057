//! Known method names and the capability each one requires.

use std::collections::BTreeSet;

use crate::types::{Capability, McpError, McpResult};

/// Notification method names.
pub mod notifications {
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Pre-2025 spelling, still sent by some clients.
    pub const INITIALIZED_ALIAS: &str = "initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PROGRESS: &str = "notifications/progress";
    pub const MESSAGE: &str = "notifications/message";
    pub const RESOURCE_UPDATED: &str = "notifications/resources/updated";
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Initialize,
    Ping,
    Shutdown,
    ToolsList,
    ToolsCall,
    PromptsList,
    PromptsGet,
    ResourcesList,
    ResourcesTemplatesList,
    ResourcesRead,
    ResourcesSubscribe,
    ResourcesUnsubscribe,
    LoggingSetLevel,
    CompletionComplete,
    RootsList,
    SamplingCreateMessage,
    ElicitationCreate,
}

impl RequestMethod {
    pub const ALL: [RequestMethod; 17] = [
        RequestMethod::Initialize,
        RequestMethod::Ping,
        RequestMethod::Shutdown,
        RequestMethod::ToolsList,
        RequestMethod::ToolsCall,
        RequestMethod::PromptsList,
        RequestMethod::PromptsGet,
        RequestMethod::ResourcesList,
        RequestMethod::ResourcesTemplatesList,
        RequestMethod::ResourcesRead,
        RequestMethod::ResourcesSubscribe,
        RequestMethod::ResourcesUnsubscribe,
        RequestMethod::LoggingSetLevel,
        RequestMethod::CompletionComplete,
        RequestMethod::RootsList,
        RequestMethod::SamplingCreateMessage,
        RequestMethod::ElicitationCreate,
    ];

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Initialize => "initialize",
            RequestMethod::Ping => "ping",
            RequestMethod::Shutdown => "shutdown",
            RequestMethod::ToolsList => "tools/list",
            RequestMethod::ToolsCall => "tools/call",
            RequestMethod::PromptsList => "prompts/list",
            RequestMethod::PromptsGet => "prompts/get",
            RequestMethod::ResourcesList => "resources/list",
            RequestMethod::ResourcesTemplatesList => "resources/templates/list",
            RequestMethod::ResourcesRead => "resources/read",
            RequestMethod::ResourcesSubscribe => "resources/subscribe",
            RequestMethod::ResourcesUnsubscribe => "resources/unsubscribe",
            RequestMethod::LoggingSetLevel => "logging/setLevel",
            RequestMethod::CompletionComplete => "completion/complete",
            RequestMethod::RootsList => "roots/list",
            RequestMethod::SamplingCreateMessage => "sampling/createMessage",
            RequestMethod::ElicitationCreate => "elicitation/create",
        }
    }

    /// Capability that must be negotiated before this method may be used.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            RequestMethod::Initialize | RequestMethod::Ping | RequestMethod::Shutdown => None,
            RequestMethod::ToolsList | RequestMethod::ToolsCall => Some(Capability::Tools),
            RequestMethod::PromptsList | RequestMethod::PromptsGet => Some(Capability::Prompts),
            RequestMethod::ResourcesList
            | RequestMethod::ResourcesTemplatesList
            | RequestMethod::ResourcesRead
            | RequestMethod::ResourcesSubscribe
            | RequestMethod::ResourcesUnsubscribe => Some(Capability::Resources),
            RequestMethod::LoggingSetLevel => Some(Capability::Logging),
            RequestMethod::CompletionComplete => Some(Capability::Completions),
            RequestMethod::RootsList => Some(Capability::Roots),
            RequestMethod::SamplingCreateMessage => Some(Capability::Sampling),
            RequestMethod::ElicitationCreate => Some(Capability::Elicitation),
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate a request headed for a server against the capabilities that server
/// negotiated. Unknown methods pass through and the server decides.
pub fn check_server_capability(method: &str, negotiated: &BTreeSet<Capability>) -> McpResult<()> {
    let Some(cap) = RequestMethod::from_method(method).and_then(|m| m.capability()) else {
        return Ok(());
    };
    if cap.is_server_side() && negotiated.contains(&cap) {
        Ok(())
    } else {
        Err(McpError::MethodNotFound(method.to_string()))
    }
}
