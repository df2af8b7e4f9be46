// src/process/shutdown.rs

//! The staged stop sequence.
//!
//! Stages run strictly in order, each bounded by its own wait and by the
//! overall deadline measured from entry:
//!
//! 1. cooperative: write quit tokens to the terminal's stdin
//! 2. signal: graceful termination signal to the process group
//! 3. tree kill: forceful kill of the process group
//! 4. system kill: the OS force-kill utility, if the tree kill failed or
//!    the process survived it
//!
//! Failures in one stage are logged and never abort the following ones.

use std::fmt;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ShutdownPolicy;
use crate::process::spawn::ChildHandle;
use crate::process::table::ProcessTable;
use crate::process::terminate::Terminator;
use crate::sinks::Sinks;

/// How long reader tasks may keep draining after the process is gone.
const READER_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cooperative,
    Signal,
    TreeKill,
    SystemKill,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Cooperative => "cooperative",
            Stage::Signal => "signal",
            Stage::TreeKill => "tree-kill",
            Stage::SystemKill => "system-kill",
        };
        f.write_str(s)
    }
}

/// Outcome of a stop or abort sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Stage after which the process was confirmed gone, if any.
    pub exited_after: Option<Stage>,
    pub elapsed: Duration,
}

struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    fn new(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.start.elapsed())
    }

    fn bounded(&self, wait: Duration) -> Duration {
        wait.min(self.remaining())
    }

    fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

/// Wait up to `limit` for the child to exit. A zero limit still reaps a
/// child that has already exited.
async fn wait_exit(child: &mut Child, limit: Duration) -> bool {
    match child.try_wait() {
        Ok(Some(_)) => return true,
        Ok(None) => {}
        Err(e) => debug!(error = %e, "try_wait failed"),
    }
    match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(%status, "terminal process exited");
            true
        }
        Ok(Err(e)) => {
            warn!(error = %e, "waiting for terminal process failed");
            false
        }
        Err(_) => false,
    }
}

fn stage_log(sinks: &Sinks, deadline: &Deadline, msg: &str) {
    sinks.info(&format!("[stop +{}ms] {msg}", deadline.elapsed_ms()));
}

fn finish(stage: Option<Stage>, deadline: &Deadline) -> ShutdownReport {
    ShutdownReport {
        exited_after: stage,
        elapsed: deadline.start.elapsed(),
    }
}

/// Full graceful-to-forceful stop sequence.
pub async fn run_stop_sequence(
    handle: &mut ChildHandle,
    policy: &ShutdownPolicy,
    terminator: &dyn Terminator,
    sinks: &Sinks,
) -> ShutdownReport {
    let deadline = Deadline::new(policy.deadline);
    let pid = handle.pid;

    if wait_exit(&mut handle.child, Duration::ZERO).await {
        stage_log(sinks, &deadline, "terminal had already exited");
        return finish(Some(Stage::Cooperative), &deadline);
    }

    if cooperative_stage(handle, policy, sinks, &deadline).await {
        return finish(Some(Stage::Cooperative), &deadline);
    }

    stage_log(sinks, &deadline, &format!("sending termination signal to pid {pid}"));
    match terminator.terminate(pid) {
        Ok(()) => {
            if wait_exit(&mut handle.child, deadline.bounded(policy.signal_wait)).await {
                stage_log(sinks, &deadline, "terminal exited after termination signal");
                return finish(Some(Stage::Signal), &deadline);
            }
            stage_log(sinks, &deadline, "terminal ignored termination signal");
        }
        Err(e) => stage_log(sinks, &deadline, &format!("termination signal failed: {e}")),
    }

    forceful_stages(handle, policy.kill_wait, terminator, sinks, &deadline).await
}

/// Abbreviated sequence for teardown paths that cannot wait: straight to the
/// tree kill, bounded by `policy.abort_budget`.
pub async fn run_abort_sequence(
    handle: &mut ChildHandle,
    policy: &ShutdownPolicy,
    terminator: &dyn Terminator,
    sinks: &Sinks,
) -> ShutdownReport {
    let deadline = Deadline::new(policy.abort_budget);
    if wait_exit(&mut handle.child, Duration::ZERO).await {
        return finish(Some(Stage::TreeKill), &deadline);
    }
    forceful_stages(handle, policy.abort_budget, terminator, sinks, &deadline).await
}

/// Returns `true` if the terminal exited in response to a quit token.
async fn cooperative_stage(
    handle: &mut ChildHandle,
    policy: &ShutdownPolicy,
    sinks: &Sinks,
    deadline: &Deadline,
) -> bool {
    let Some(stdin) = handle.stdin.as_mut() else {
        stage_log(sinks, deadline, "no input stream; skipping cooperative shutdown");
        return false;
    };

    // Keep enough of the deadline for the signal and kill stages.
    let reserve = policy.signal_wait + policy.kill_wait;

    for token in &policy.quit_tokens {
        if deadline.remaining() <= reserve {
            stage_log(sinks, deadline, "deadline near; ending cooperative shutdown");
            break;
        }

        stage_log(sinks, deadline, &format!("sending '{token}'"));
        let line = format!("{token}\n");
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if e.kind() == ErrorKind::BrokenPipe {
                stage_log(sinks, deadline, "input stream closed by terminal");
            } else {
                stage_log(sinks, deadline, &format!("writing '{token}' failed: {e}"));
            }
            break;
        }

        let wait = deadline.bounded(policy.token_wait.min(deadline.remaining().saturating_sub(reserve)));
        if wait_exit(&mut handle.child, wait).await {
            stage_log(sinks, deadline, &format!("terminal exited after '{token}'"));
            return true;
        }
    }

    // The pipe may have been closed by the child without it exiting yet.
    wait_exit(&mut handle.child, Duration::ZERO).await
}

async fn forceful_stages(
    handle: &mut ChildHandle,
    kill_wait: Duration,
    terminator: &dyn Terminator,
    sinks: &Sinks,
    deadline: &Deadline,
) -> ShutdownReport {
    let pid = handle.pid;

    stage_log(sinks, deadline, &format!("killing process tree of pid {pid}"));
    match terminator.kill_tree(pid) {
        Ok(()) => {
            if wait_exit(&mut handle.child, deadline.bounded(kill_wait)).await {
                stage_log(sinks, deadline, "process tree killed");
                return finish(Some(Stage::TreeKill), deadline);
            }
            stage_log(sinks, deadline, "terminal survived process tree kill");
        }
        Err(e) => stage_log(sinks, deadline, &format!("process tree kill failed: {e}")),
    }

    stage_log(sinks, deadline, &format!("system-level force kill of pid {pid}"));
    if let Err(e) = terminator.system_kill(pid) {
        debug!(pid, error = %e, "system-level kill failed");
    }
    if wait_exit(&mut handle.child, deadline.bounded(kill_wait)).await {
        stage_log(sinks, deadline, "terminal killed by system-level kill");
        return finish(Some(Stage::SystemKill), deadline);
    }

    stage_log(
        sinks,
        deadline,
        &format!("could not confirm that pid {pid} exited; giving up"),
    );
    finish(None, deadline)
}

/// Close the terminal's streams, best-effort.
///
/// Stdin is shut down and dropped; the output readers get a short grace
/// period to drain what is left, then are aborted (a detached grandchild may
/// keep the pipes open forever).
pub async fn close_streams(handle: &mut ChildHandle, grace: bool) {
    if let Some(mut stdin) = handle.stdin.take() {
        if let Err(e) = stdin.shutdown().await {
            debug!(error = %e, "closing terminal stdin failed");
        }
    }

    let grace_deadline = Instant::now() + if grace { READER_GRACE } else { Duration::ZERO };
    for reader in handle.readers.iter_mut() {
        let left = grace_deadline.saturating_duration_since(Instant::now());
        if timeout(left, &mut *reader).await.is_err() {
            reader.abort();
        }
    }
    handle.readers.clear();
}

/// Force-kill stray processes left behind by the terminal.
///
/// Targets are `recorded` (descendants seen before the stop sequence, still
/// present now), the descendants of `pid` that remain, and anything whose
/// command line mentions the artifact. Never kills the calling process.
/// Returns the number of processes killed.
pub fn sweep(
    table: &dyn ProcessTable,
    pid: u32,
    recorded: &[u32],
    artifact_name: &str,
    sinks: &Sinks,
) -> usize {
    let me = std::process::id();

    let mut targets: Vec<u32> = recorded
        .iter()
        .copied()
        .filter(|p| table.process_exists(*p))
        .collect();
    let found = table
        .find_processes_by_ancestor(pid)
        .into_iter()
        .chain(table.find_processes_by_command_substring(artifact_name));
    for p in found {
        if !targets.contains(&p) {
            targets.push(p);
        }
    }
    targets.retain(|p| *p != me && *p != pid);

    let mut killed = 0;
    for target in targets {
        match table.force_kill(target) {
            Ok(()) => {
                killed += 1;
                sinks.info(&format!("Killed leftover terminal process {target}."));
            }
            Err(e) => {
                warn!(pid = target, error = %e, "failed to kill leftover process");
                sinks.log(&format!("Could not kill leftover process {target}: {e}"));
            }
        }
    }
    killed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTable {
        descendants: Vec<u32>,
        by_cmd: Vec<u32>,
        live: Vec<u32>,
        fail: Vec<u32>,
        killed: Mutex<Vec<u32>>,
    }

    impl ProcessTable for RecordingTable {
        fn find_processes_by_ancestor(&self, _pid: u32) -> Vec<u32> {
            self.descendants.clone()
        }

        fn find_processes_by_command_substring(&self, _text: &str) -> Vec<u32> {
            self.by_cmd.clone()
        }

        fn process_exists(&self, pid: u32) -> bool {
            self.live.contains(&pid)
        }

        fn force_kill(&self, pid: u32) -> io::Result<()> {
            if self.fail.contains(&pid) {
                return Err(io::Error::other("denied"));
            }
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }

    #[test]
    fn sweep_dedups_and_spares_self() {
        let me = std::process::id();
        let table = RecordingTable {
            descendants: vec![11, 12],
            by_cmd: vec![12, 13, me],
            fail: vec![13],
            ..Default::default()
        };
        let sinks = Sinks::new();

        let killed = sweep(&table, 10, &[], "ThetaTerminal.jar", &sinks);

        assert_eq!(killed, 2);
        assert_eq!(*table.killed.lock().unwrap(), vec![11, 12]);
    }

    #[test]
    fn sweep_kills_recorded_descendants_that_survived() {
        // 21 was reparented away from the terminal and still runs; 22 is gone.
        let table = RecordingTable {
            live: vec![21],
            ..Default::default()
        };
        let sinks = Sinks::new();

        let killed = sweep(&table, 10, &[21, 22], "ThetaTerminal.jar", &sinks);

        assert_eq!(killed, 1);
        assert_eq!(*table.killed.lock().unwrap(), vec![21]);
    }

    #[test]
    fn deadline_bounds_waits() {
        let d = Deadline::new(Duration::from_millis(50));
        assert!(d.bounded(Duration::from_secs(3)) <= Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(d.remaining(), Duration::ZERO);
    }
}
