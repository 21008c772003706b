mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use picoclaw_manager::RemoteAction;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Server(args) => commands::server::cmd_server(args).await?,
        Commands::Start(args) => commands::remote::cmd_remote(RemoteAction::Start, args).await?,
        Commands::Stop(args) => commands::remote::cmd_remote(RemoteAction::Stop, args).await?,
        Commands::Restart(args) => {
            commands::remote::cmd_remote(RemoteAction::Restart, args).await?
        }
        Commands::Status(args) => commands::remote::cmd_remote(RemoteAction::Status, args).await?,
        Commands::Logs(args) => commands::remote::cmd_remote(RemoteAction::Logs, args).await?,
        Commands::Update(args) => commands::remote::cmd_remote(RemoteAction::Update, args).await?,
        Commands::Version => commands::remote::cmd_version(),
    }

    Ok(())
}

/// Log to stderr so client output on stdout stays pipeable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
