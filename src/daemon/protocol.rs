//! Result types returned by supervisor and updater operations.
//!
//! Every operation yields one of these values instead of an error; the same
//! value is serialized verbatim as the HTTP response body.

use serde::{Deserialize, Serialize};

/// How an operation ended, beyond the wire-visible `success` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// The requested transition happened (or was already satisfied for stop).
    #[default]
    Done,
    /// Start refused because the gateway is already running.
    AlreadyRunning,
    /// The operation could not be carried out.
    Failed,
}

/// Result of start, stop and restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip)]
    pub outcome: Outcome,
}

impl ActionResult {
    pub fn done(message: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            success: true,
            message: message.into(),
            pid,
            outcome: Outcome::Done,
        }
    }

    pub fn already_running(pid: u32) -> Self {
        Self {
            success: false,
            message: "PicoClaw gateway is already running".to_string(),
            pid: Some(pid),
            outcome: Outcome::AlreadyRunning,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            pid: None,
            outcome: Outcome::Failed,
        }
    }
}

/// Point-in-time view of the supervised gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub pid: Option<u32>,
    /// RFC 3339 launch time.
    pub started_at: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub binary: String,
    pub recent_logs: Vec<String>,
}

/// Latest published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub release_url: String,
}

/// Result of comparing the installed gateway against the latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub installed_version: String,
    pub latest_version: Option<String>,
    pub update_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of an in-place upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    /// Combined installer output.
    pub message: String,
    pub updated: bool,
    pub was_running: bool,
    pub restarted: bool,
}

/// Body of the unauthenticated health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}
