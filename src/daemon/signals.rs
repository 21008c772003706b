//! Signal delivery to the managed process and its process group.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

/// Signal the whole process group led by `pid`, or just `pid` if the group
/// cannot be resolved. Returns the group id that was signaled, if any.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: StopSignal) -> Option<i32> {
    let sig = match signal {
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    let pid = pid as libc::pid_t;

    // SAFETY: getpgid/kill only read their integer arguments.
    let pgid = unsafe { libc::getpgid(pid) };
    if pgid > 0 {
        debug!("Sending {:?} to process group {}", signal, pgid);
        unsafe {
            libc::kill(-pgid, sig);
        }
        Some(pgid)
    } else {
        debug!("Process group lookup failed, sending {:?} to PID {}", signal, pid);
        unsafe {
            libc::kill(pid, sig);
        }
        None
    }
}

#[cfg(not(unix))]
pub fn signal_group(pid: u32, _signal: StopSignal) -> Option<i32> {
    // No process groups; taskkill /T covers the child tree.
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
    None
}
