use serde::Deserialize;
use std::sync::OnceLock;

static PROJECT_CONFIG: OnceLock<ProjectConfig> = OnceLock::new();

const CONFIG_TOML: &str = include_str!("../config.toml");

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub project: Project,
    pub manager: ManagerDefaults,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub repository: String,
}

/// Built-in defaults for the daemon's listener and release lookups.
#[derive(Debug, Deserialize)]
pub struct ManagerDefaults {
    pub port: u16,
    pub host: String,
    pub github_api: String,
}

impl ProjectConfig {
    pub fn get() -> &'static ProjectConfig {
        PROJECT_CONFIG
            .get_or_init(|| toml::from_str(CONFIG_TOML).expect("Failed to parse config.toml"))
    }

    /// Repository slug in `owner/repo` form.
    /// Example: "https://github.com/muava12/picoclaw-fork" -> "muava12/picoclaw-fork"
    pub fn repository_slug(&self) -> String {
        repository_slug(&self.project.repository)
    }
}

/// Reduce a repository URL (or an existing slug) to `owner/repo`.
pub fn repository_slug(repository: &str) -> String {
    let url = repository.trim_end_matches('/').trim_end_matches(".git");
    let parts: Vec<&str> = url.split('/').filter(|p| !p.is_empty()).collect();

    match parts.as_slice() {
        [.., owner, repo] => format!("{}/{}", owner, repo),
        _ => url.to_string(),
    }
}
