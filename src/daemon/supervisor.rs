//! Lifecycle management for the single supervised gateway process.
//!
//! All state lives behind one async mutex. Mutating operations hold it for
//! their whole critical section, including the graceful-wait/forced-kill
//! sequence, so start, stop, restart, update and status never interleave.
//!
//! Each spawned process gets two background tasks:
//! - an output pump that forwards combined stdout/stderr lines to the daemon
//!   log and into the bounded [`LogBuffer`], and
//! - a reaper that waits on the child, publishes the exit through a watch
//!   channel, and clears the handle when the exit was not caused by `stop`.

use super::env_file::{env_file_for, load_env_file};
use super::log_buffer::{LogBuffer, RECENT_LINES};
use super::protocol::{ActionResult, StatusSnapshot};
use super::signals::{signal_group, StopSignal};
use crate::error::{Result, SupervisorError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Grace period between SIGTERM and SIGKILL.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between stopping and relaunching.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Subcommand that runs the gateway in server mode.
const GATEWAY_SUBCOMMAND: &str = "gateway";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary_path: PathBuf,
    /// Reserved for the gateway; not read by the manager.
    pub config_path: PathBuf,
    /// Release repository as `owner/repo`.
    pub repository: String,
}

struct RunningProcess {
    pid: u32,
    generation: u64,
    started_at: DateTime<Utc>,
    exited: watch::Receiver<bool>,
}

impl RunningProcess {
    fn is_alive(&self) -> bool {
        !*self.exited.borrow()
    }
}

struct SupervisorState {
    process: Option<RunningProcess>,
    log_buffer: LogBuffer,
    /// Bumped on every spawn so stale pumps and reapers leave newer state alone.
    generation: u64,
}

impl SupervisorState {
    fn live_process(&self) -> Option<&RunningProcess> {
        self.process.as_ref().filter(|p| p.is_alive())
    }
}

pub struct ProcessSupervisor {
    config: SupervisorConfig,
    state: Arc<Mutex<SupervisorState>>,
    stop_timeout: Duration,
    settle_delay: Duration,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SupervisorState {
                process: None,
                log_buffer: LogBuffer::default(),
                generation: 0,
            })),
            stop_timeout: GRACEFUL_STOP_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the SIGTERM grace period
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Override the stop-to-start settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.config.binary_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config.config_path
    }

    pub fn repository(&self) -> &str {
        &self.config.repository
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Take exclusive control of the supervisor for a multi-step operation.
    pub async fn lock(&self) -> SupervisorGuard<'_> {
        SupervisorGuard {
            supervisor: self,
            state: self.state.lock().await,
        }
    }

    pub async fn start(&self) -> ActionResult {
        self.lock().await.start()
    }

    pub async fn stop(&self) -> ActionResult {
        self.lock().await.stop().await
    }

    pub async fn restart(&self) -> ActionResult {
        self.lock().await.restart().await
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.lock().await.status()
    }

    pub async fn is_running(&self) -> bool {
        self.lock().await.is_running()
    }
}

/// Exclusive access to supervisor state; operations on it never interleave
/// with other callers.
pub struct SupervisorGuard<'a> {
    supervisor: &'a ProcessSupervisor,
    state: MutexGuard<'a, SupervisorState>,
}

impl SupervisorGuard<'_> {
    pub fn is_running(&self) -> bool {
        self.state.live_process().is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.live_process().map(|p| p.pid)
    }

    /// Launch the gateway unless one is already running.
    pub fn start(&mut self) -> ActionResult {
        if let Some(pid) = self.pid() {
            debug!("Start requested while PicoClaw gateway is running (PID {})", pid);
            return ActionResult::already_running(pid);
        }

        match self.spawn() {
            Ok(pid) => {
                info!("PicoClaw gateway started (PID: {})", pid);
                ActionResult::done("PicoClaw gateway started", Some(pid))
            }
            Err(e) => {
                error!("Failed to start PicoClaw gateway: {}", e);
                ActionResult::failed(e.to_string())
            }
        }
    }

    /// Terminate the gateway, escalating to SIGKILL after the grace period.
    ///
    /// Returns only once the process has been reaped.
    pub async fn stop(&mut self) -> ActionResult {
        let Some(process) = self.state.live_process() else {
            self.state.process = None;
            return ActionResult::done("PicoClaw gateway is not running", None);
        };
        let pid = process.pid;
        let mut exited = process.exited.clone();
        let timeout = self.supervisor.stop_timeout;

        info!("Stopping PicoClaw gateway (PID: {})", pid);
        signal_group(pid, StopSignal::Terminate);

        if tokio::time::timeout(timeout, wait_for_exit(&mut exited))
            .await
            .is_err()
        {
            warn!(
                "PicoClaw gateway (PID: {}) did not stop within {:?}, force killing",
                pid, timeout
            );
            signal_group(pid, StopSignal::Kill);
            wait_for_exit(&mut exited).await;
        }

        self.state.process = None;
        info!("PicoClaw gateway stopped (PID: {})", pid);
        ActionResult::done(format!("PicoClaw gateway stopped (PID: {})", pid), None)
    }

    /// Stop (if running), wait out the settle delay, then start.
    pub async fn restart(&mut self) -> ActionResult {
        if self.is_running() {
            self.stop().await;
            tokio::time::sleep(self.supervisor.settle_delay).await;
        }
        self.start()
    }

    pub fn status(&self) -> StatusSnapshot {
        let live = self.state.live_process();
        let now = Utc::now();

        StatusSnapshot {
            running: live.is_some(),
            pid: live.map(|p| p.pid),
            started_at: live.map(|p| p.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            uptime_seconds: live.map(|p| (now - p.started_at).num_seconds().max(0) as u64),
            binary: self.supervisor.config.binary_path.display().to_string(),
            recent_logs: self.state.log_buffer.tail(RECENT_LINES),
        }
    }

    fn spawn(&mut self) -> Result<u32> {
        let binary = &self.supervisor.config.binary_path;
        if !binary.exists() {
            return Err(SupervisorError::BinaryNotFound(binary.clone()));
        }

        let mut cmd = Command::new(binary);
        cmd.arg(GATEWAY_SUBCOMMAND)
            .envs(load_env_file(&env_file_for(binary)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so stop can signal the gateway's children too.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;

        let (Some(stdout), Some(stderr), Some(pid)) =
            (child.stdout.take(), child.stderr.take(), child.id())
        else {
            let _ = child.start_kill();
            return Err(SupervisorError::Pipe(
                "child output streams unavailable".to_string(),
            ));
        };

        self.state.generation += 1;
        let generation = self.state.generation;
        self.state.log_buffer.clear();

        let (exit_tx, exit_rx) = watch::channel(false);
        let shared = &self.supervisor.state;
        spawn_output_pump(generation, stdout, stderr, Arc::clone(shared));
        spawn_reaper(generation, pid, child, exit_tx, Arc::clone(shared));

        self.state.process = Some(RunningProcess {
            pid,
            generation,
            started_at: Utc::now(),
            exited: exit_rx,
        });

        Ok(pid)
    }
}

async fn wait_for_exit(exited: &mut watch::Receiver<bool>) {
    // A closed channel means the reaper finished, so the child is gone either way.
    let _ = exited.wait_for(|done| *done).await;
}

/// Read combined stdout/stderr lines into the log buffer until both close.
///
/// Reading never waits on the supervisor lock: while an operation holds it
/// (stop can for the whole grace period), lines queue in a local bounded
/// buffer so the child never blocks on a full pipe.
fn spawn_output_pump(
    generation: u64,
    stdout: ChildStdout,
    stderr: ChildStderr,
    state: Arc<Mutex<SupervisorState>>,
) {
    tokio::spawn(async move {
        let mut out = BufReader::new(stdout).split(b'\n');
        let mut err = BufReader::new(stderr).split(b'\n');
        let mut out_open = true;
        let mut err_open = true;
        let mut pending = LogBuffer::default();
        let mut stale = false;

        while out_open || err_open {
            tokio::select! {
                seg = out.next_segment(), if out_open => {
                    out_open = take_line(seg, &mut pending, stale);
                }
                seg = err.next_segment(), if err_open => {
                    err_open = take_line(seg, &mut pending, stale);
                }
                mut guard = state.lock(), if !pending.is_empty() => {
                    stale = !flush_pending(generation, &mut pending, &mut guard);
                }
            }
        }

        if !stale && !pending.is_empty() {
            let mut guard = state.lock().await;
            flush_pending(generation, &mut pending, &mut guard);
        }
        debug!("Output pump for generation {} finished", generation);
    });
}

/// Log one segment and queue it. Returns whether the stream is still open.
fn take_line(
    segment: std::io::Result<Option<Vec<u8>>>,
    pending: &mut LogBuffer,
    stale: bool,
) -> bool {
    match segment {
        Ok(Some(raw)) => {
            let line = decode_line(&raw);
            info!(target: "picoclaw", "{}", line);
            if !stale {
                pending.push(line);
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!("Gateway output stream closed: {}", e);
            false
        }
    }
}

/// Move queued lines into the shared tail. Returns false once a newer
/// process owns the tail; the queue is discarded then.
fn flush_pending(generation: u64, pending: &mut LogBuffer, state: &mut SupervisorState) -> bool {
    if state.generation != generation {
        pending.clear();
        return false;
    }
    for line in pending.drain() {
        state.log_buffer.push(line);
    }
    true
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Wait on the child so natural exits are reaped without an API call.
fn spawn_reaper(
    generation: u64,
    pid: u32,
    mut child: Child,
    exit_tx: watch::Sender<bool>,
    state: Arc<Mutex<SupervisorState>>,
) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => info!("PicoClaw gateway (PID: {}) exited: {}", pid, status),
            Err(e) => warn!("Failed to wait on PicoClaw gateway (PID: {}): {}", pid, e),
        }
        exit_tx.send_replace(true);

        let mut state = state.lock().await;
        if state
            .process
            .as_ref()
            .is_some_and(|p| p.generation == generation)
        {
            state.process = None;
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::daemon::test_support::{fake_gateway, supervisor_for, wait_for_status};
    use serial_test::serial;
    use std::time::Instant;
    use tempfile::TempDir;

    const WELL_BEHAVED: &str = r#"
echo "gateway starting"
echo "mode=${GATEWAY_MODE:-unset}"
echo "warning on stderr" >&2
trap 'echo "shutting down"; exit 0' TERM
while true; do sleep 1; done
"#;

    const IGNORES_SIGTERM: &str = r#"
trap '' TERM
echo "stubborn gateway"
while true; do sleep 1; done
"#;

    #[tokio::test]
    async fn test_stop_when_idle_is_repeatable_success() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(dir.path().join("missing"));

        for _ in 0..3 {
            let result = supervisor.stop().await;
            assert!(result.success);
            assert!(result.pid.is_none());
        }
    }

    #[tokio::test]
    async fn test_start_with_missing_binary_fails_without_state() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(dir.path().join("missing"));

        let result = supervisor.start().await;
        assert!(!result.success);
        assert!(result.message.contains("Binary not found"));
        assert!(!supervisor.status().await.running);
    }

    #[tokio::test]
    #[serial]
    async fn test_start_then_start_again_reports_existing_pid() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(fake_gateway(dir.path(), WELL_BEHAVED));

        let first = supervisor.start().await;
        assert!(first.success);
        let pid = first.pid.unwrap();

        let second = supervisor.start().await;
        assert!(!second.success);
        assert_eq!(second.pid, Some(pid));

        let status = supervisor.status().await;
        assert!(status.running);
        assert_eq!(status.pid, Some(pid));
        assert!(status.started_at.is_some());

        assert!(supervisor.stop().await.success);
        let status = supervisor.status().await;
        assert!(!status.running);
        assert!(status.pid.is_none());
        assert!(status.uptime_seconds.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial]
    async fn test_concurrent_starts_spawn_exactly_one_process() {
        let dir = TempDir::new().unwrap();
        let supervisor = Arc::new(supervisor_for(fake_gateway(dir.path(), WELL_BEHAVED)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let supervisor = Arc::clone(&supervisor);
                tokio::spawn(async move { supervisor.start().await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let winners: Vec<_> = results.iter().filter(|r| r.success).collect();
        assert_eq!(winners.len(), 1);
        let pid = winners[0].pid.unwrap();
        assert!(results
            .iter()
            .filter(|r| !r.success)
            .all(|r| r.pid == Some(pid)));

        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_output_from_both_streams_reaches_log_tail() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(fake_gateway(dir.path(), WELL_BEHAVED));
        supervisor.start().await;

        let ready = wait_for_status(&supervisor, |s| s.recent_logs.len() >= 3).await;
        assert!(ready, "gateway output never arrived");

        let logs = supervisor.status().await.recent_logs;
        assert!(logs.contains(&"gateway starting".to_string()));
        assert!(logs.contains(&"warning on stderr".to_string()));

        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_env_file_next_to_binary_is_applied() {
        let dir = TempDir::new().unwrap();
        let binary = fake_gateway(dir.path(), WELL_BEHAVED);
        std::fs::write(
            dir.path().join(".env"),
            "# overrides\nGATEWAY_MODE=ignored\nGATEWAY_MODE = from env $file\n",
        )
        .unwrap();
        let supervisor = supervisor_for(binary);
        supervisor.start().await;

        let found = wait_for_status(&supervisor, |s| {
            s.recent_logs.iter().any(|l| l == "mode=from env $file")
        })
        .await;
        assert!(found);

        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_log_tail_stays_bounded() {
        let dir = TempDir::new().unwrap();
        let script = r#"
i=0
while [ $i -lt 150 ]; do echo "line $i"; i=$((i+1)); done
while true; do sleep 1; done
"#;
        let supervisor = supervisor_for(fake_gateway(dir.path(), script));
        supervisor.start().await;

        let done = wait_for_status(&supervisor, |s| {
            s.recent_logs.last().map(String::as_str) == Some("line 149")
        })
        .await;
        assert!(done);

        {
            let guard = supervisor.lock().await;
            assert_eq!(guard.state.log_buffer.len(), 100);
        }
        let status = supervisor.status().await;
        assert_eq!(status.recent_logs.len(), 20);
        assert_eq!(status.recent_logs[0], "line 130");

        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_crashed_process_is_reaped_and_can_restart() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(fake_gateway(dir.path(), "echo boom\nexit 3\n"));

        assert!(supervisor.start().await.success);
        let exited = wait_for_status(&supervisor, |s| !s.running).await;
        assert!(exited);

        let mut cleared = false;
        for _ in 0..100 {
            if supervisor.lock().await.state.process.is_none() {
                cleared = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cleared, "reaper never cleared the handle");

        let again = supervisor.start().await;
        assert!(again.success, "restart after crash failed: {}", again.message);
        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_escalates_to_kill_after_grace_period() {
        let dir = TempDir::new().unwrap();
        let grace = Duration::from_millis(800);
        let supervisor =
            supervisor_for(fake_gateway(dir.path(), IGNORES_SIGTERM)).with_stop_timeout(grace);

        let pid = supervisor.start().await.pid.unwrap();
        wait_for_status(&supervisor, |s| !s.recent_logs.is_empty()).await;

        let started = Instant::now();
        let result = supervisor.stop().await;
        assert!(result.success);
        assert!(started.elapsed() >= grace);

        // Reaped: the pid no longer exists.
        let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
        assert!(!alive);
        assert!(!supervisor.status().await.running);
    }

    #[tokio::test]
    #[serial]
    async fn test_output_keeps_draining_while_stop_holds_lock() {
        let dir = TempDir::new().unwrap();
        // On SIGTERM, write well past one pipe buffer before exiting cleanly.
        let script = r#"
trap 'i=0; while [ $i -lt 2000 ]; do echo "draining line $i ..........................................................................."; i=$((i+1)); done; echo "shutdown complete"; exit 0' TERM
echo "ready"
while true; do sleep 1; done
"#;
        let grace = Duration::from_secs(3);
        let supervisor =
            supervisor_for(fake_gateway(dir.path(), script)).with_stop_timeout(grace);
        supervisor.start().await;
        assert!(wait_for_status(&supervisor, |s| !s.recent_logs.is_empty()).await);

        let started = Instant::now();
        assert!(supervisor.stop().await.success);
        assert!(
            started.elapsed() < grace,
            "gateway was force killed while flushing output"
        );

        let flushed = wait_for_status(&supervisor, |s| {
            s.recent_logs.last().map(String::as_str) == Some("shutdown complete")
        })
        .await;
        assert!(flushed);
    }

    #[tokio::test]
    #[serial]
    async fn test_restart_when_idle_behaves_like_start() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(fake_gateway(dir.path(), WELL_BEHAVED));

        let result = supervisor.restart().await;
        assert!(result.success);
        assert!(result.pid.is_some());

        supervisor.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_restart_when_running_yields_new_pid() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_for(fake_gateway(dir.path(), WELL_BEHAVED))
            .with_settle_delay(Duration::from_millis(100));

        let before = supervisor.start().await.pid.unwrap();
        let after = supervisor.restart().await;
        assert!(after.success);
        assert_ne!(after.pid, Some(before));
        assert_eq!(supervisor.status().await.pid, after.pid);

        supervisor.stop().await;
    }

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(b"hello\r"), "hello");
        assert_eq!(decode_line(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");
    }
}
