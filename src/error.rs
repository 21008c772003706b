use std::path::PathBuf;
use thiserror::Error;

/// Failures while launching the managed gateway.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Failed to set up output pipe: {0}")]
    Pipe(String),

    #[error("Failed to launch PicoClaw: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failures while checking for or applying an update.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("{0}")]
    Network(#[from] reqwest::Error),

    #[error("release endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid release metadata: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed to run installer: {0}")]
    Installer(#[from] std::io::Error),
}

/// Failures while talking to a running manager.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Cannot reach PicoClaw manager at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to PicoClaw manager failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
