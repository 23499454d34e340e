//! proxmox-mcp CLI
//!
//! Run `proxmox-mcp --help` for usage information.

use clap::{Parser, Subcommand};
use proxmox_mcp::config::{Config, LoggingConfig, RuntimeOptions};
use proxmox_mcp::mcp::McpServer;
use proxmox_mcp::openapi::OpenApiServer;
use proxmox_mcp::prompts::{parse_assignment, PromptError, TemplateConfig, DEFAULT_TEMPLATE_PATH};
use proxmox_mcp::proxmox::{connectivity_check, ProxmoxApi, ProxmoxClient};
use proxmox_mcp::tools::{all_definitions, ToolRegistry};
use proxmox_mcp::{logging, plan, Error};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "proxmox-mcp",
    about = "Proxmox VE tools for AI assistants over MCP stdio and an OpenAPI proxy",
    version
)]
struct Cli {
    /// JSON configuration file (overrides PROXMOX_MCP_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio (default)
    Mcp,

    /// Serve the tools over HTTP with an OpenAPI document
    Openapi {
        /// Address to bind to (default OPENAPI_HOST:OPENAPI_PORT)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List available tools
    Tools {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Verify configuration and connectivity
    Check,

    /// Show the VM changes needed to match a YAML spec
    Plan {
        /// Infrastructure spec
        file: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a natural-language prompt for a tool
    Prompt {
        /// Tool (template key)
        tool: String,

        /// Integration YAML with command templates
        #[arg(short, long, default_value = DEFAULT_TEMPLATE_PATH)]
        templates: PathBuf,

        /// Template parameter, repeatable
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_set)]
        set: Vec<(String, String)>,
    },
}

fn parse_set(input: &str) -> Result<(String, String), PromptError> {
    parse_assignment(input)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let options = RuntimeOptions::from_env()?;

    match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Tools { format } => {
            logging::init(&LoggingConfig::default(), &options, cli.verbose);
            list_tools(&format)
        }
        Commands::Prompt { tool, templates, set } => {
            logging::init(&LoggingConfig::default(), &options, cli.verbose);
            render_prompt(tool, templates, set).await
        }
        command => {
            let config = Config::resolve(cli.config.as_deref()).await?;
            if let Some(path) = logging::init(&config.logging, &options, cli.verbose) {
                info!(path = %path.display(), "Logging to file");
            }

            match command {
                Commands::Openapi { bind } => {
                    let bind = bind.unwrap_or_else(|| options.openapi_bind());
                    let api = connect(&config, &options).await?;
                    let registry = Arc::new(ToolRegistry::new(api));
                    OpenApiServer::new(registry, options.openapi_api_key.clone())
                        .run(&bind)
                        .await?;
                    Ok(())
                }
                Commands::Check => check(&config).await,
                Commands::Plan { file, json } => {
                    let api = ProxmoxClient::new(&config.proxmox, &config.auth)?;
                    let plan = plan::plan_file(&api, &file).await?;
                    print!("{}", plan::render(&plan, json)?);
                    Ok(())
                }
                _ => {
                    let api = connect(&config, &options).await?;
                    let registry = Arc::new(ToolRegistry::new(api));
                    McpServer::new(registry).run_stdio().await?;
                    Ok(())
                }
            }
        }
    }
}

/// Build the API client and probe it unless skipped
///
/// A failed probe is only logged: the MCP client would otherwise see the
/// server vanish before the handshake.
async fn connect(config: &Config, options: &RuntimeOptions) -> Result<Arc<dyn ProxmoxApi>, Error> {
    let client = ProxmoxClient::new(&config.proxmox, &config.auth)?;
    let api: Arc<dyn ProxmoxApi> = Arc::new(client);

    if options.skip_connect_test {
        info!("Skipping Proxmox connectivity check");
        return Ok(api);
    }

    match connectivity_check(api.as_ref()).await {
        Ok(version) => info!(
            host = %config.proxmox.host,
            port = config.proxmox.port,
            version = %version,
            "Connected to Proxmox"
        ),
        Err(e) => warn!(
            host = %config.proxmox.host,
            error = %e,
            "Proxmox connectivity check failed, tools will retry on use"
        ),
    }

    Ok(api)
}

async fn check(config: &Config) -> Result<(), Error> {
    let client = ProxmoxClient::new(&config.proxmox, &config.auth)?;
    let version = connectivity_check(&client).await?;

    println!(
        "Connected to {} ({}:{}) as {}",
        config.proxmox.service,
        config.proxmox.host,
        config.proxmox.port,
        config.auth.token_id()
    );
    println!("Proxmox version: {}", version);
    Ok(())
}

fn list_tools(format: &str) -> Result<(), Error> {
    let definitions = all_definitions();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&definitions)?);
        }
        _ => {
            println!("{:<32} {}", "TOOL", "DESCRIPTION");
            println!("{}", "-".repeat(80));
            for tool in &definitions {
                let summary = tool
                    .description
                    .split_once(". ")
                    .map(|(first, _)| first)
                    .unwrap_or(&tool.description);
                println!("{:<32} {}", tool.name, summary.trim_end_matches('.'));
            }
            println!("\n{} tools", definitions.len());
        }
    }

    Ok(())
}

async fn render_prompt(
    tool: String,
    templates: PathBuf,
    set: Vec<(String, String)>,
) -> Result<(), Error> {
    let config = TemplateConfig::load(&templates).await?;
    let params: BTreeMap<String, String> = set.into_iter().collect();
    println!("{}", config.render(&tool, &params));
    Ok(())
}
