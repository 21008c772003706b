//! Thin HTTP client used by the `piman` remote subcommands.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;

/// Long enough for an update, which stops, installs and restarts.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Control operations reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    Start,
    Stop,
    Restart,
    Status,
    Logs,
    Update,
}

impl RemoteAction {
    pub fn path(self) -> &'static str {
        match self {
            Self::Start => "/api/picoclaw/start",
            Self::Stop => "/api/picoclaw/stop",
            Self::Restart => "/api/picoclaw/restart",
            Self::Update => "/api/picoclaw/update",
            Self::Status | Self::Logs => "/api/picoclaw/status",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Self::Status | Self::Logs => Method::GET,
            _ => Method::POST,
        }
    }
}

/// Decoded manager reply.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    /// JSON body, or the raw text as a string when it is not JSON.
    pub body: Value,
}

impl RemoteResponse {
    /// `recent_logs` from a status body.
    pub fn recent_logs(&self) -> Vec<&str> {
        self.body["recent_logs"]
            .as_array()
            .map(|lines| lines.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn pretty(&self) -> String {
        match &self.body {
            Value::String(raw) => raw.clone(),
            body => serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()),
        }
    }
}

pub struct ManagerClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ManagerClient {
    /// Client for a manager on this host.
    pub fn local(port: u16, token: Option<String>) -> Result<Self, ClientError> {
        Self::new(format!("http://127.0.0.1:{}", port), token)
    }

    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub async fn send(&self, action: RemoteAction) -> Result<RemoteResponse, ClientError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), action.path());
        debug!("{} {}", action.method(), url);

        let mut request = self.client.request(action.method(), &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| {
            if source.is_connect() || source.is_timeout() {
                ClientError::Unreachable {
                    url: url.clone(),
                    source,
                }
            } else {
                ClientError::Http(source)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(RemoteResponse { status, body })
    }
}
