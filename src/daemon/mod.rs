//! PicoClaw manager daemon - supervises the gateway process
//!
//! Internal daemon that handles:
//! - Gateway lifecycle (start, stop, restart) with graceful-then-forceful shutdown
//! - Bounded capture of the gateway's combined output
//! - Version checks and in-place upgrades through the external installer
//!
//! # Architecture
//!
//! One supervisor owns one gateway process. The HTTP control API and the
//! updater both drive it through its lock, so operations never interleave.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             piman server                  │
//! ├──────────────────────────────────────────┤
//! │  HTTP API  │  Updater  │  Supervisor     │
//! │  (axum)    │ (GitHub)  │  (pump/reaper)  │
//! ├──────────────────────────────────────────┤
//! │            picoclaw gateway               │
//! └──────────────────────────────────────────┘
//! ```

pub mod env_file;
pub mod executor;
pub mod log_buffer;
pub mod protocol;
pub mod server;
pub mod signals;
pub mod supervisor;
pub mod updater;

pub use executor::{CommandExecutor, InstallOutput};
pub use log_buffer::LogBuffer;
pub use protocol::{ActionResult, Outcome, StatusSnapshot, UpdateCheck, UpdateResult};
pub use server::{DaemonConfig, DaemonServer};
pub use supervisor::{ProcessSupervisor, SupervisorConfig};
pub use updater::UpdateOrchestrator;
