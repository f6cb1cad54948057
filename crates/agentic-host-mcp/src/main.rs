//! AgenticHost MCP entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use agentic_host_mcp::client::{ClientConnection, ClientOptions};
use agentic_host_mcp::config::{resolve_config_path, HostConfig};
use agentic_host_mcp::host::{AllowAllPolicy, AllowListPolicy, HostProcess, SecurityPolicy};
use agentic_host_mcp::protocol::{serve_connection, ProtocolHandler};
use agentic_host_mcp::tools::BuiltinToolProvider;
use agentic_host_mcp::transport::{ProcessTransport, StdioTransport};

#[derive(Parser)]
#[command(
    name = "agentic-host-mcp",
    about = "MCP protocol engine for AgenticHost: serve over stdio or HTTP, or host MCP servers",
    version
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Start MCP server over HTTP.
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3100")]
        addr: String,

        /// Bearer token for authentication.
        /// Also reads from AGENTIC_TOKEN env var.
        #[arg(long)]
        token: Option<String>,
    },

    /// Spawn the configured servers, register them and print their context.
    Host,

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   agentic-host-mcp completions bash > ~/.local/share/bash-completion/completions/agentic-host-mcp
    ///   agentic-host-mcp completions zsh > ~/.zfunc/_agentic-host-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = HostConfig::load(&config_path)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let handler = ProtocolHandler::new(&config.server, config.providers());
            serve_connection(handler, Arc::new(StdioTransport::stdio())).await?;
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp { addr, token } => {
            use agentic_host_mcp::auth::{AccessPolicy, AllowAllAccess, ScopeAccessPolicy};
            use agentic_host_mcp::config::TOKEN_ENV;
            use agentic_host_mcp::transport::HttpTransport;

            // Resolve token: CLI flag > env var
            let effective_token = token.or_else(|| std::env::var(TOKEN_ENV).ok());

            let auth = config.auth.authorization(effective_token.as_deref());
            let access: Arc<dyn AccessPolicy> = if auth.is_some() {
                Arc::new(ScopeAccessPolicy)
            } else {
                Arc::new(AllowAllAccess)
            };

            // Every session draws on the same rate-limit budget.
            let limits = config.server.rate_limits.limits();
            let server = config.server.clone();
            let providers = config.providers();
            let mut transport = HttpTransport::new(Arc::new(move || {
                ProtocolHandler::new(&server, providers.clone())
                    .with_access(access.clone())
                    .with_limits(limits.clone())
            }));

            if let Some(auth) = auth {
                tracing::info!("Auth: bearer token required, tool and resource access by scope");
                transport = transport.with_auth(auth);
            }

            tracing::info!("AgenticHost MCP server ({})", config.server.name);
            transport.run(&addr).await?;
        }

        Commands::Host => run_host(&config).await?,

        Commands::Info => {
            let providers = config.providers();
            let offered = config
                .server
                .capabilities
                .restricted_to(&providers.servable());
            let tools = BuiltinToolProvider::list_tools();
            let info = serde_json::json!({
                "server": { "name": config.server.name, "version": config.server.version },
                "protocol_versions": config.server.protocol_versions,
                "capabilities": offered,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
                "prompt_count": config.prompts.len(),
                "resource_count": config.resources.len(),
                "completion_count": config.completions.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "agentic-host-mcp",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

async fn run_host(config: &HostConfig) -> anyhow::Result<()> {
    let section = &config.host;
    let policy: Box<dyn SecurityPolicy> = if section.allowed_clients.is_empty() {
        Box::new(AllowAllPolicy)
    } else {
        Box::new(AllowListPolicy::new(section.allowed_clients.iter().cloned()))
    };
    let host = HostProcess::new(move |client: &agentic_host_mcp::types::Implementation| {
        policy.allow(client)
    });

    for server in &section.servers {
        let transport = match ProcessTransport::spawn(&server.command, &server.args, &server.env) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!("Could not start {}: {e}", server.name);
                continue;
            }
        };
        let options = ClientOptions::named(server.name.clone())
            .with_request_timeout(section.request_timeout_ms)
            .with_elicitation_timeout(section.elicitation_timeout_ms);
        let client = Arc::new(ClientConnection::new(Arc::new(transport), options));

        if let Err(e) = host.register(&server.name, client).await {
            tracing::warn!("Could not register {}: {e}", server.name);
        }
    }

    let summary = serde_json::json!({
        "clients": host.client_ids().await,
        "sessions": host.sessions().await,
        "context": host.aggregate_context().await,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    host.close().await;
    Ok(())
}
