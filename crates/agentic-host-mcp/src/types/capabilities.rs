//! MCP capability and initialization types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Protocol revisions this engine speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const SERVER_NAME: &str = "agentic-host-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A named optional protocol feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Prompts,
    Resources,
    Tools,
    Logging,
    Completions,
    Roots,
    Sampling,
    Elicitation,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Prompts => "prompts",
            Capability::Resources => "resources",
            Capability::Tools => "tools",
            Capability::Logging => "logging",
            Capability::Completions => "completions",
            Capability::Roots => "roots",
            Capability::Sampling => "sampling",
            Capability::Elicitation => "elicitation",
        }
    }

    /// Whether the capability is declared by servers (as opposed to clients).
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            Capability::Prompts
                | Capability::Resources
                | Capability::Tools
                | Capability::Logging
                | Capability::Completions
        )
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
    /// Keys this engine does not know. Kept as sent, never treated as declared.
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElicitationCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionsCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

impl ClientCapabilities {
    pub fn declared(&self) -> BTreeSet<Capability> {
        let mut set = BTreeSet::new();
        if self.roots.is_some() {
            set.insert(Capability::Roots);
        }
        if self.sampling.is_some() {
            set.insert(Capability::Sampling);
        }
        if self.elicitation.is_some() {
            set.insert(Capability::Elicitation);
        }
        set
    }
}

impl ServerCapabilities {
    pub fn declared(&self) -> BTreeSet<Capability> {
        let mut set = BTreeSet::new();
        if self.logging.is_some() {
            set.insert(Capability::Logging);
        }
        if self.prompts.is_some() {
            set.insert(Capability::Prompts);
        }
        if self.resources.is_some() {
            set.insert(Capability::Resources);
        }
        if self.tools.is_some() {
            set.insert(Capability::Tools);
        }
        if self.completions.is_some() {
            set.insert(Capability::Completions);
        }
        set
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.declared().contains(&capability)
    }

    /// Copy of this declaration keeping only the capabilities in `allowed`.
    pub fn restricted_to(&self, allowed: &BTreeSet<Capability>) -> Self {
        Self {
            experimental: self.experimental.clone(),
            logging: self
                .logging
                .clone()
                .filter(|_| allowed.contains(&Capability::Logging)),
            prompts: self
                .prompts
                .clone()
                .filter(|_| allowed.contains(&Capability::Prompts)),
            resources: self
                .resources
                .clone()
                .filter(|_| allowed.contains(&Capability::Resources)),
            tools: self
                .tools
                .clone()
                .filter(|_| allowed.contains(&Capability::Tools)),
            completions: self
                .completions
                .clone()
                .filter(|_| allowed.contains(&Capability::Completions)),
            other: self.other.clone(),
        }
    }

    pub fn default_capabilities() -> Self {
        Self {
            experimental: None,
            logging: Some(LoggingCapability {}),
            prompts: Some(PromptsCapability {
                list_changed: false,
            }),
            resources: Some(ResourcesCapability {
                subscribe: true,
                list_changed: false,
            }),
            tools: Some(ToolsCapability {
                list_changed: false,
            }),
            completions: Some(CompletionsCapability {}),
            other: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_means_declared() {
        let caps: ServerCapabilities = serde_json::from_value(json!({ "prompts": {} })).unwrap();
        assert_eq!(caps.declared(), BTreeSet::from([Capability::Prompts]));
        assert!(!caps.supports(Capability::Tools));
    }

    #[test]
    fn test_restriction_drops_undeclared() {
        let allowed = BTreeSet::from([Capability::Tools]);
        let caps = ServerCapabilities::default_capabilities().restricted_to(&allowed);
        assert_eq!(caps.declared(), allowed);
    }

    #[test]
    fn test_client_capabilities_wire_shape() {
        let caps: ClientCapabilities =
            serde_json::from_value(json!({ "roots": { "listChanged": true }, "elicitation": {} }))
                .unwrap();
        assert_eq!(
            caps.declared(),
            BTreeSet::from([Capability::Roots, Capability::Elicitation])
        );
        assert!(caps.roots.unwrap().list_changed);
    }

    #[test]
    fn test_unknown_keys_survive_but_are_not_declared() {
        let wire = json!({ "logging": {}, "vendorFeature": { "depth": 2 } });
        let caps: ServerCapabilities = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(caps.declared(), BTreeSet::from([Capability::Logging]));
        assert_eq!(caps.other["vendorFeature"]["depth"], 2);

        let kept = caps.restricted_to(&BTreeSet::new());
        assert!(kept.declared().is_empty());
        assert_eq!(
            serde_json::to_value(&kept).unwrap(),
            json!({ "vendorFeature": { "depth": 2 } })
        );
        assert_eq!(serde_json::to_value(&caps).unwrap(), wire);

        let client: ClientCapabilities =
            serde_json::from_value(json!({ "roots": {}, "x-draft": true })).unwrap();
        assert_eq!(client.declared(), BTreeSet::from([Capability::Roots]));
        assert_eq!(serde_json::to_value(&client).unwrap()["x-draft"], true);
    }

    #[test]
    fn test_completions_is_server_side() {
        let caps: ServerCapabilities =
            serde_json::from_value(json!({ "completions": {} })).unwrap();
        assert!(caps.supports(Capability::Completions));
        assert!(Capability::Completions.is_server_side());
    }
}
