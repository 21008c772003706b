use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::UpdateError;

/// Captured result of an installer run.
#[derive(Debug, Clone)]
pub struct InstallOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
}

/// Runs the pre-approved install action through `bash -c`.
pub struct CommandExecutor {
    shell: String,
    command: String,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            shell: "bash".to_string(),
            command: command.into(),
        }
    }

    /// Installer that pipes the repository's `install_picoclaw.sh` into bash.
    pub fn for_repository(repository: &str) -> Self {
        Self::new(default_install_command(repository))
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the action to completion, capturing combined output.
    pub async fn run(&self) -> Result<InstallOutput, UpdateError> {
        info!("Running installer: {}", self.command);
        let started = Instant::now();

        // Fold stderr into stdout for the whole script, pipelines included.
        let script = format!("exec 2>&1\n{}", self.command);
        let output = Command::new(&self.shell).arg("-c").arg(script).output().await?;

        let result = InstallOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
        };
        debug!(
            "Installer finished with exit code {:?} in {:?}",
            result.exit_code,
            started.elapsed()
        );
        Ok(result)
    }
}

pub fn default_install_command(repository: &str) -> String {
    format!(
        "curl -fsSL https://raw.githubusercontent.com/{}/main/install_picoclaw.sh | bash",
        repository
    )
}
