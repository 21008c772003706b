use std::path::PathBuf;

use crate::project_config::ProjectConfig;

/// Environment variables consulted by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    ManagerToken,
    ManagerPort,
    PicoclawBin,
    PicoclawConfig,
    PicoclawRepo,
    GithubApi,
    InstallCommand,
}

impl EnvVar {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManagerToken => "PICOCLAW_MANAGER_TOKEN",
            Self::ManagerPort => "PICOCLAW_MANAGER_PORT",
            Self::PicoclawBin => "PICOCLAW_BIN",
            Self::PicoclawConfig => "PICOCLAW_CONFIG",
            Self::PicoclawRepo => "PICOCLAW_REPO",
            Self::GithubApi => "PICOCLAW_GITHUB_API",
            Self::InstallCommand => "PICOCLAW_INSTALL_COMMAND",
        }
    }
}

const FALLBACK_HOME: &str = "~";

/// Read a variable, treating empty values as unset.
pub fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str()).ok().filter(|v| !v.is_empty())
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
}

/// Bearer token shared by daemon and client ($PICOCLAW_MANAGER_TOKEN)
pub fn manager_token() -> Option<String> {
    let token = env_opt(EnvVar::ManagerToken);
    tracing::trace!(present = token.is_some(), "PICOCLAW_MANAGER_TOKEN env var");
    token
}

/// Port used by the remote client ($PICOCLAW_MANAGER_PORT or the built-in default)
pub fn manager_port() -> u16 {
    let port = env_opt(EnvVar::ManagerPort)
        .and_then(|s| s.parse().ok())
        .unwrap_or(ProjectConfig::get().manager.port);
    tracing::trace!(port, "Manager port");
    port
}

/// Gateway binary ($PICOCLAW_BIN or ~/.local/bin/picoclaw)
pub fn picoclaw_bin() -> PathBuf {
    let path = env_opt(EnvVar::PicoclawBin)
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".local").join("bin").join("picoclaw"));
    tracing::trace!(path = %path.display(), "Gateway binary path");
    path
}

/// Gateway config file ($PICOCLAW_CONFIG or ~/.picoclaw/config.json)
pub fn picoclaw_config() -> PathBuf {
    let path = env_opt(EnvVar::PicoclawConfig)
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".picoclaw").join("config.json"));
    tracing::trace!(path = %path.display(), "Gateway config path");
    path
}

/// Release repository as `owner/repo` ($PICOCLAW_REPO or the embedded project repository)
pub fn picoclaw_repo() -> String {
    let repo = env_opt(EnvVar::PicoclawRepo)
        .map(|r| crate::project_config::repository_slug(&r))
        .unwrap_or_else(|| ProjectConfig::get().repository_slug());
    tracing::trace!(repo = %repo, "Release repository");
    repo
}

/// GitHub REST base URL ($PICOCLAW_GITHUB_API or https://api.github.com)
pub fn github_api() -> String {
    let url = env_opt(EnvVar::GithubApi)
        .unwrap_or_else(|| ProjectConfig::get().manager.github_api.clone());
    tracing::trace!(url = %url, "GitHub API base");
    url
}

/// Override for the shell command that installs a new gateway build ($PICOCLAW_INSTALL_COMMAND)
pub fn install_command() -> Option<String> {
    let cmd = env_opt(EnvVar::InstallCommand);
    tracing::trace!(value = ?cmd, "Install command override");
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_are_under_home() {
        if env_opt(EnvVar::PicoclawBin).is_none() {
            assert!(picoclaw_bin().ends_with(".local/bin/picoclaw"));
        }
        if env_opt(EnvVar::PicoclawConfig).is_none() {
            assert!(picoclaw_config().ends_with(".picoclaw/config.json"));
        }
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(EnvVar::ManagerToken.as_str(), "PICOCLAW_MANAGER_TOKEN");
        assert_eq!(EnvVar::PicoclawBin.as_str(), "PICOCLAW_BIN");
    }
}
