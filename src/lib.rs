pub mod client;
pub mod clienv;
pub mod daemon;
pub mod error;
pub mod http_server;
pub mod project_config;

pub use client::{ManagerClient, RemoteAction};
pub use error::{ClientError, Result, SupervisorError, UpdateError};
