// src/process/terminate.rs

//! Platform termination primitives behind a trait, so the stop sequence in
//! [`super::shutdown`] is platform-agnostic and each stage can be made to
//! fail in tests.
//!
//! The terminal is launched as the leader of its own process group (unix)
//! or in a new process group (Windows), so the group id equals its pid.

use std::io;

use tracing::debug;

pub trait Terminator: Send + Sync {
    /// Graceful termination request for the terminal's process tree.
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forceful kill of the whole process tree / group.
    fn kill_tree(&self, pid: u32) -> io::Result<()>;

    /// Last resort: the OS force-kill-by-pid utility.
    fn system_kill(&self, pid: u32) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsTerminator;

#[cfg(unix)]
fn signal_group(pgid: u32, sig: libc::c_int) -> io::Result<()> {
    // Negative pid means "the whole process group".
    let ret = unsafe { libc::kill(-(pgid as libc::pid_t), sig) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn signal_pid(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn run_utility(program: &str, args: &[String]) -> io::Result<()> {
    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(0x0800_0000);
    }

    let status = cmd.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{program} {args:?} exited with {status}")))
    }
}

/// Kill a single process immediately.
#[cfg(unix)]
pub fn force_kill_pid(pid: u32) -> io::Result<()> {
    signal_pid(pid, libc::SIGKILL)
}

/// Kill a single process immediately.
#[cfg(windows)]
pub fn force_kill_pid(pid: u32) -> io::Result<()> {
    run_utility("taskkill", &["/F".into(), "/PID".into(), pid.to_string()])
}

#[cfg(unix)]
impl Terminator for OsTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        match signal_group(pid, libc::SIGTERM) {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(pid, error = %e, "SIGTERM to process group failed; signalling pid");
                signal_pid(pid, libc::SIGTERM)
            }
        }
    }

    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        signal_group(pid, libc::SIGKILL)
    }

    fn system_kill(&self, pid: u32) -> io::Result<()> {
        run_utility("kill", &["-9".into(), pid.to_string()])
    }
}

#[cfg(windows)]
impl Terminator for OsTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        run_utility("taskkill", &["/T".into(), "/PID".into(), pid.to_string()])
    }

    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        run_utility(
            "taskkill",
            &["/F".into(), "/T".into(), "/PID".into(), pid.to_string()],
        )
    }

    fn system_kill(&self, pid: u32) -> io::Result<()> {
        run_utility("taskkill", &["/F".into(), "/PID".into(), pid.to_string()])
    }
}
