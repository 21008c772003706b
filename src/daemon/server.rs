use super::executor::CommandExecutor;
use super::supervisor::{ProcessSupervisor, SupervisorConfig};
use super::updater::UpdateOrchestrator;
use crate::clienv;
use crate::http_server::{build_router, AppState};
use crate::project_config::ProjectConfig;
use anyhow::{Context, Result};
use console::style;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
    pub binary_path: PathBuf,
    pub config_path: PathBuf,
    /// Release repository as `owner/repo`.
    pub repository: String,
    pub github_api: String,
    /// Replaces the default `install_picoclaw.sh` pipeline when set.
    pub install_command: Option<String>,
    pub auto_start: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let defaults = &ProjectConfig::get().manager;
        Self {
            host: defaults.host.clone(),
            port: defaults.port,
            token: clienv::manager_token(),
            binary_path: clienv::picoclaw_bin(),
            config_path: clienv::picoclaw_config(),
            repository: clienv::picoclaw_repo(),
            github_api: clienv::github_api(),
            install_command: clienv::install_command(),
            auto_start: false,
        }
    }
}

pub struct DaemonServer {
    config: DaemonConfig,
    supervisor: Arc<ProcessSupervisor>,
    updater: Arc<UpdateOrchestrator>,
}

impl DaemonServer {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let supervisor = Arc::new(ProcessSupervisor::new(SupervisorConfig {
            binary_path: config.binary_path.clone(),
            config_path: config.config_path.clone(),
            repository: config.repository.clone(),
        }));

        let installer = match &config.install_command {
            Some(command) => CommandExecutor::new(command.clone()),
            None => CommandExecutor::for_repository(&config.repository),
        };
        let updater = UpdateOrchestrator::new(
            Arc::clone(&supervisor),
            config.github_api.clone(),
            installer,
        )
        .context("Failed to build release client")?;

        Ok(Self {
            config,
            supervisor,
            updater: Arc::new(updater),
        })
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub async fn run(self) -> Result<()> {
        info!("PicoClaw manager starting...");

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("Control API listening on http://{}", local_addr);

        if self.config.token.as_deref().map_or(true, str::is_empty) {
            warn!("No bearer token configured; control endpoints are unauthenticated");
        }

        if self.config.auto_start {
            info!("Auto-starting PicoClaw gateway");
            let result = self.supervisor.start().await;
            if !result.success {
                warn!("Failed to auto-start PicoClaw gateway: {}", result.message);
            }
        }

        self.print_banner(local_addr);

        let app = build_router(AppState::new(
            Arc::clone(&self.supervisor),
            Arc::clone(&self.updater),
            self.config.token.clone(),
        ));

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal()?)
            .await
            .context("Control API server failed")?;

        info!("Stopping PicoClaw gateway...");
        self.supervisor.stop().await;

        info!("PicoClaw manager stopped");
        Ok(())
    }

    fn print_banner(&self, addr: SocketAddr) {
        println!();
        println!("  {}", style("PicoClaw Manager").cyan().bold());
        println!();
        println!("  {:<11} http://{}", style("Listening").dim(), addr);
        println!(
            "  {:<11} {}",
            style("Binary").dim(),
            self.config.binary_path.display()
        );
        println!();
        println!("  {}", style("Endpoints:").bold());
        for (method, path, about) in ENDPOINTS {
            println!("    {:<5} {:<28} {}", method, path, style(about).dim());
        }
        println!();
    }
}

const ENDPOINTS: [(&str, &str, &str); 7] = [
    ("GET", "/api/health", "Health check"),
    ("GET", "/api/picoclaw/status", "Gateway status"),
    ("GET", "/api/picoclaw/check-update", "Compare with latest release"),
    ("POST", "/api/picoclaw/start", "Start gateway"),
    ("POST", "/api/picoclaw/stop", "Stop gateway"),
    ("POST", "/api/picoclaw/restart", "Restart gateway"),
    ("POST", "/api/picoclaw/update", "Install latest release"),
];

/// Resolves on the first SIGTERM or SIGINT (Ctrl+C elsewhere).
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C");
    })
}
