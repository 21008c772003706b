use clap::{Args, Parser, Subcommand};
use picoclaw_manager::clienv;
use picoclaw_manager::project_config::ProjectConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "piman")]
#[command(version)]
#[command(about = "PicoClaw Manager - supervise the PicoClaw gateway", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the manager daemon and its HTTP control API
    Server(ServerArgs),

    /// Start the gateway
    Start(RemoteArgs),

    /// Stop the gateway
    Stop(RemoteArgs),

    /// Restart the gateway
    Restart(RemoteArgs),

    /// Show gateway status
    Status(RemoteArgs),

    /// Print the gateway's recent output
    Logs(RemoteArgs),

    /// Install the latest gateway release
    Update(RemoteArgs),

    /// Print the manager version
    Version,
}

#[derive(Args)]
pub(crate) struct ServerArgs {
    /// Port for the control API
    #[arg(long, default_value_t = default_port())]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value_t = default_host())]
    pub host: String,

    /// Bearer token required on control endpoints
    #[arg(long, env = "PICOCLAW_MANAGER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to the picoclaw binary (default: ~/.local/bin/picoclaw)
    #[arg(long = "picoclaw-bin", env = "PICOCLAW_BIN")]
    pub picoclaw_bin: Option<PathBuf>,

    /// Path to the gateway config.json (default: ~/.picoclaw/config.json)
    #[arg(long, env = "PICOCLAW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Release repository, as owner/repo or a GitHub URL
    #[arg(long, env = "PICOCLAW_REPO")]
    pub repo: Option<String>,

    /// Start the gateway as soon as the server is up
    #[arg(long)]
    pub auto_start: bool,
}

#[derive(Args)]
pub(crate) struct RemoteArgs {
    /// Port of the running manager
    #[arg(long, default_value_t = default_port())]
    pub port: u16,

    /// Bearer token for the manager
    #[arg(long, env = "PICOCLAW_MANAGER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

fn default_port() -> u16 {
    clienv::manager_port()
}

fn default_host() -> String {
    ProjectConfig::get().manager.host.clone()
}
