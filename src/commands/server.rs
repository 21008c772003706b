use crate::args::ServerArgs;
use picoclaw_manager::clienv;
use picoclaw_manager::daemon::{DaemonConfig, DaemonServer};
use picoclaw_manager::project_config::repository_slug;

pub(crate) async fn cmd_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = server_config(args);
    DaemonServer::new(config)?.run().await
}

fn server_config(args: ServerArgs) -> DaemonConfig {
    DaemonConfig {
        host: args.host,
        port: args.port,
        token: args.token.filter(|t| !t.is_empty()),
        binary_path: args.picoclaw_bin.unwrap_or_else(clienv::picoclaw_bin),
        config_path: args.config.unwrap_or_else(clienv::picoclaw_config),
        repository: args
            .repo
            .map(|r| repository_slug(&r))
            .unwrap_or_else(clienv::picoclaw_repo),
        github_api: clienv::github_api(),
        install_command: clienv::install_command(),
        auto_start: args.auto_start,
    }
}
