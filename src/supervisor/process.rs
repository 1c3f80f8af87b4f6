//! Subprocess lifecycle: spawn in a fresh process group, stale-PID
//! cleanup, graceful-then-forceful termination (spec §4.7 "Spawn"/"Stale-
//! process cleanup"/"Graceful shutdown").
//!
//! No teacher analogue runs subprocesses directly; structured after
//! `groblegark-oddjobs`'s daemon lifecycle (lock-then-spawn-then-persist)
//! but built on `nix::sys::signal`/`nix::unistd` for the process-group
//! semantics the spec calls for, since a signal to a group is how a
//! single `SIGTERM` reaps a subprocess's own children too.

use std::net::TcpStream;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::{Result, StigmerError};

/// A subprocess the supervisor owns: its PID, the process-group id it was
/// placed in (equal to the PID, since it is the group leader), and where
/// combined stdout/stderr is redirected.
pub struct SupervisedProcess {
    pub pid: i32,
    pub log_path: PathBuf,
}

/// Spawns `program` as the leader of a new process group, redirecting
/// stdout and stderr to a single append-mode log file (spec §4.7 "Log
/// multiplexing").
pub fn spawn_in_process_group(program: &Path, args: &[String], log_path: &Path) -> Result<SupervisedProcess> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| StigmerError::internal(format!("creating log directory: {err}")))?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|err| StigmerError::internal(format!("opening log file {}: {err}", log_path.display())))?;
    let log_file_err = log_file
        .try_clone()
        .map_err(|err| StigmerError::internal(format!("cloning log file handle: {err}")))?;

    let mut command = std::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err));

    // Detach into its own process group so a single signal to the group
    // reaps any children the subprocess itself spawns.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map(|_| ()).map_err(std::io::Error::from)
        });
    }

    let child = command
        .spawn()
        .map_err(|err| StigmerError::internal(format!("spawning {}: {err}", program.display())))?;
    let pid = child.id() as i32;
    // We never call `wait()` on `child` — the supervisor tracks liveness by
    // PID and reaps via the OS once the watchdog detects exit, matching the
    // "owns lifecycle, not a blocking handle" shape of the rest of this
    // module. Leaking the `Child` here is intentional: dropping it would
    // not kill the process (it's double-forked via setsid) but would
    // otherwise nag clippy about an unused zombie-reaping responsibility.
    std::mem::forget(child);

    Ok(SupervisedProcess {
        pid,
        log_path: log_path.to_path_buf(),
    })
}

/// True if a process exists under `pid` (signal 0 is the POSIX
/// existence probe: no signal is sent, only error semantics are checked).
pub fn process_exists(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

/// Port-liveness check used as part of the server's liveness probe and
/// the stale-process "is this still the same program" check (spec §4.7).
pub fn port_is_accepting(addr: &str, timeout: Duration) -> bool {
    use std::net::ToSocketAddrs;
    let Ok(addrs) = addr.to_socket_addrs() else {
        return false;
    };
    addrs.into_iter().any(|socket_addr| TcpStream::connect_timeout(&socket_addr, timeout).is_ok())
}

/// Kills the process group led by `pid`: `SIGTERM`, wait up to `deadline`
/// polling for exit, then `SIGKILL` if it is still alive (spec §4.7
/// "Graceful shutdown"). Tolerates `EPERM` on an already-dead process, the
/// error macOS returns in that race instead of `ESRCH`.
pub fn terminate_process_group(pid: i32, deadline: Duration) {
    let group = Pid::from_raw(-pid);
    if let Err(err) = signal::kill(group, Signal::SIGTERM) {
        if err != nix::errno::Errno::ESRCH && err != nix::errno::Errno::EPERM {
            warn!(pid, error = %err, "SIGTERM to process group failed");
        }
        return;
    }

    let poll_interval = Duration::from_millis(200);
    let mut waited = Duration::ZERO;
    while waited < deadline {
        if !process_exists(pid) {
            info!(pid, "process group exited after SIGTERM");
            return;
        }
        std::thread::sleep(poll_interval);
        waited += poll_interval;
    }

    warn!(pid, "process group still alive after deadline; sending SIGKILL");
    if let Err(err) = signal::kill(group, Signal::SIGKILL) {
        if err != nix::errno::Errno::ESRCH && err != nix::errno::Errno::EPERM {
            warn!(pid, error = %err, "SIGKILL to process group failed");
        }
    }
}

/// Stale-process cleanup (spec §4.7): if a PID file names a still-living
/// process, the caller decides via `still_same_program` whether it is the
/// program we expect; if not, the whole group is force-killed.
pub fn cleanup_stale(pid_path: &Path, still_same_program: impl FnOnce(i32) -> bool) -> Result<()> {
    let Ok(contents) = std::fs::read_to_string(pid_path) else {
        return Ok(());
    };
    let Ok(pid) = contents.trim().parse::<i32>() else {
        let _ = std::fs::remove_file(pid_path);
        return Ok(());
    };

    if process_exists(pid) && !still_same_program(pid) {
        warn!(pid, path = %pid_path.display(), "stale process detected, force-killing group");
        terminate_process_group(pid, Duration::from_secs(0));
    }

    std::fs::remove_file(pid_path).ok();
    Ok(())
}

pub fn write_pid_file(pid_path: &Path, pid: i32) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| StigmerError::internal(format!("creating pid directory: {err}")))?;
    }
    std::fs::write(pid_path, pid.to_string())
        .map_err(|err| StigmerError::internal(format!("writing pid file {}: {err}", pid_path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_exists_is_true_for_self() {
        assert!(process_exists(std::process::id() as i32));
    }

    #[test]
    fn process_exists_is_false_for_unused_pid() {
        // PID 2^30 is outside any realistic pid_max; treat as "not running".
        assert!(!process_exists(1 << 30));
    }

    #[test]
    fn port_is_accepting_is_false_for_closed_port() {
        assert!(!port_is_accepting("127.0.0.1:1", Duration::from_millis(100)));
    }
}
