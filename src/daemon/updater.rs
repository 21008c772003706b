use super::executor::CommandExecutor;
use super::protocol::{ReleaseInfo, UpdateCheck, UpdateResult};
use super::supervisor::ProcessSupervisor;
use crate::error::UpdateError;
use regex::Regex;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const UNKNOWN_VERSION: &str = "unknown";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

static VERSION_RE: OnceLock<Regex> = OnceLock::new();

/// `GET /repos/{owner}/{repo}/releases/latest` body, reduced to what we read.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    html_url: String,
}

/// Checks for and applies gateway updates around the supervisor.
pub struct UpdateOrchestrator {
    supervisor: Arc<ProcessSupervisor>,
    client: reqwest::Client,
    api_base: String,
    installer: CommandExecutor,
    version_timeout: Duration,
}

impl UpdateOrchestrator {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        api_base: impl Into<String>,
        installer: CommandExecutor,
    ) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("picoclaw-manager/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self {
            supervisor,
            client,
            api_base: api_base.into(),
            installer,
            version_timeout: VERSION_TIMEOUT,
        })
    }

    /// Override how long `--version` may run
    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    /// Version reported by `<binary> --version`, or `"unknown"`.
    pub async fn installed_version(&self) -> String {
        let binary = self.supervisor.binary_path();
        let mut cmd = Command::new(binary);
        cmd.arg("--version").stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.version_timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                debug!("{} --version exited with {}", binary.display(), output.status);
                return UNKNOWN_VERSION.to_string();
            }
            Ok(Err(e)) => {
                debug!("Failed to run {} --version: {}", binary.display(), e);
                return UNKNOWN_VERSION.to_string();
            }
            Err(_) => {
                warn!(
                    "{} --version did not finish within {:?}",
                    binary.display(),
                    self.version_timeout
                );
                return UNKNOWN_VERSION.to_string();
            }
        };

        parse_version(&String::from_utf8_lossy(&output.stdout))
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub async fn fetch_latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let url = format!(
            "{}/repos/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.supervisor.repository()
        );
        debug!("Fetching release metadata from {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status(status));
        }

        let body = response.bytes().await?;
        let release: GithubRelease = serde_json::from_slice(&body)?;

        Ok(ReleaseInfo {
            version: strip_v(&release.tag_name).to_string(),
            release_url: release.html_url,
        })
    }

    /// Compare installed and latest versions. Never fails; fetch problems
    /// are reported in the `error` field.
    pub async fn check_update(&self) -> UpdateCheck {
        let installed = self.installed_version().await;

        match self.fetch_latest_release().await {
            Ok(release) => UpdateCheck {
                update_available: update_available(&installed, &release.version),
                installed_version: installed,
                latest_version: Some(release.version),
                release_url: Some(release.release_url),
                error: None,
            },
            Err(e) => {
                warn!("Update check failed: {}", e);
                UpdateCheck {
                    installed_version: installed,
                    latest_version: None,
                    update_available: false,
                    release_url: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Stop the gateway if running, run the installer, and bring the
    /// gateway back if it was running, whether or not the install worked.
    ///
    /// Holds the supervisor lock throughout.
    pub async fn update(&self) -> UpdateResult {
        let mut guard = self.supervisor.lock().await;
        let was_running = guard.is_running();

        if was_running {
            info!("Stopping PicoClaw gateway for update");
            guard.stop().await;
            tokio::time::sleep(self.supervisor.settle_delay()).await;
        }

        let (success, message) = match self.installer.run().await {
            Ok(out) => {
                if out.success {
                    info!("PicoClaw update installed");
                } else {
                    warn!("Installer exited with {:?}", out.exit_code);
                }
                (out.success, out.output)
            }
            Err(e) => {
                error!("Installer could not run: {}", e);
                (false, e.to_string())
            }
        };

        let restarted = if was_running {
            let result = guard.start();
            if !result.success {
                warn!("Failed to restart PicoClaw gateway after update: {}", result.message);
            }
            result.success
        } else {
            false
        };

        UpdateResult {
            success,
            message,
            updated: success,
            was_running,
            restarted,
        }
    }
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Extract the first `v?MAJOR.MINOR.PATCH[suffix]` token, without the `v`.
pub fn parse_version(output: &str) -> Option<String> {
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"v?[0-9]+\.[0-9]+\.[0-9]+[^\s)*]*").expect("version pattern is valid")
    });
    re.find(output).map(|m| strip_v(m.as_str()).to_string())
}

pub fn update_available(installed: &str, latest: &str) -> bool {
    !latest.is_empty() && installed != latest
}
