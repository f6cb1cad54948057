//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use agentic_host::{
    CompletionEntry, InMemoryCompletionProvider, InMemoryPromptProvider,
    InMemoryResourceProvider, PromptTemplate, StaticResource, DEFAULT_PAGE_SIZE,
};

use crate::auth::{
    AuthorizationManager, BearerTokenStrategy, Principal, StaticTokenResolver, SCOPE_ALL,
};
use crate::protocol::{Providers, RateLimitConfig};
use crate::tools::BuiltinToolProvider;
use crate::types::{
    McpError, McpResult, ServerCapabilities, SERVER_NAME, SERVER_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};

pub const CONFIG_ENV: &str = "AGENTIC_HOST_CONFIG";
pub const TOKEN_ENV: &str = "AGENTIC_TOKEN";

/// Resolve the config file path.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_config = PathBuf::from(".agentic-host/config.json");
    if cwd_config.exists() {
        return cwd_config;
    }

    resolve_default_config_path()
}

fn resolve_default_config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(format!("{home}/.agentic-host/config.json"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub host: HostSection,
    pub prompts: Vec<PromptTemplate>,
    pub resources: Vec<StaticResource>,
    /// Candidate values for `completion/complete`.
    pub completions: Vec<CompletionEntry>,
}

impl HostConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> McpResult<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text).map_err(|e| {
            McpError::InvalidParams(format!("invalid config {}: {e}", path.display()))
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Built-in tools plus the configured prompt, resource and completion
    /// catalogs. An empty catalog registers no provider, so its capability is
    /// not offered.
    pub fn providers(&self) -> Providers {
        let page_size = self.server.page_size;
        let mut providers =
            Providers::default().with_tools(BuiltinToolProvider::new(page_size));
        if !self.prompts.is_empty() {
            providers = providers.with_prompts(
                InMemoryPromptProvider::new(self.prompts.clone()).with_page_size(page_size),
            );
        }
        if !self.resources.is_empty() {
            providers = providers.with_resources(
                InMemoryResourceProvider::new(self.resources.clone()).with_page_size(page_size),
            );
        }
        if !self.completions.is_empty() {
            providers = providers
                .with_completions(InMemoryCompletionProvider::new(self.completions.clone()));
        }
        providers
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
    pub protocol_versions: Vec<String>,
    /// Declared capabilities. Only those backed by a provider are offered.
    pub capabilities: ServerCapabilities,
    pub page_size: usize,
    pub rate_limits: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
            instructions: None,
            protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            capabilities: ServerCapabilities::default_capabilities(),
            page_size: DEFAULT_PAGE_SIZE,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub principal: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthConfig {
    /// Build the bearer chain. `extra_token`, if given, maps to a `default`
    /// principal holding every scope. `None` when no token is configured.
    pub fn authorization(&self, extra_token: Option<&str>) -> Option<AuthorizationManager> {
        let mut resolver = StaticTokenResolver::new();
        for entry in &self.tokens {
            resolver = resolver.with_token(
                entry.token.clone(),
                Principal::new(entry.principal.clone(), entry.scopes.iter().cloned()),
            );
        }
        if let Some(token) = extra_token.filter(|t| !t.is_empty()) {
            resolver = resolver.with_token(token, Principal::new("default", [SCOPE_ALL]));
        }
        if resolver.is_empty() {
            return None;
        }
        Some(AuthorizationManager::new().with_strategy(BearerTokenStrategy::new(resolver)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostSection {
    /// Client and server names the security policy admits. Empty admits all.
    pub allowed_clients: Vec<String>,
    pub servers: Vec<ServerCommand>,
    pub request_timeout_ms: u64,
    /// Wait for elicitation answers. Zero is unbounded.
    pub elicitation_timeout_ms: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            allowed_clients: Vec::new(),
            servers: Vec::new(),
            request_timeout_ms: 30_000,
            elicitation_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCommand {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}
