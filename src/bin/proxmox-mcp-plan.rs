//! Standalone IaC planner
//!
//! `proxmox-mcp-plan infra.yaml [--json]` prints the VM creates, changes and
//! deletes needed to match the spec. The cluster is only read.

use clap::Parser;
use proxmox_mcp::config::{Config, RuntimeOptions};
use proxmox_mcp::proxmox::ProxmoxClient;
use proxmox_mcp::{logging, plan, Error};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "proxmox-mcp-plan",
    about = "Plan Proxmox VM changes from a YAML infrastructure spec",
    version
)]
struct Cli {
    /// Infrastructure spec
    file: PathBuf,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,

    /// JSON configuration file (overrides PROXMOX_MCP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
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
    let config = Config::resolve(cli.config.as_deref()).await?;
    logging::init(&config.logging, &options, cli.verbose);

    let api = ProxmoxClient::new(&config.proxmox, &config.auth)?;
    let plan = plan::plan_file(&api, &cli.file).await?;
    print!("{}", plan::render(&plan, cli.json)?);
    Ok(())
}
