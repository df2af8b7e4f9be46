// src/process/spawn.rs

//! Launching the terminal process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use anyhow::Context;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{Result, SupervisorError};
use crate::types::Credentials;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// What to run: `program [args...] <artifact> <username> <password>`.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub artifact: PathBuf,
    pub credentials: Credentials,
}

impl LaunchSpec {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&self.artifact)
            .arg(&self.credentials.username)
            .arg(&self.credentials.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so the stop sequence can signal the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);

        cmd
    }
}

/// A just-spawned child with its pipes still detached.
pub struct Spawned {
    pub child: Child,
    pub pid: u32,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

pub fn spawn_child(spec: &LaunchSpec) -> Result<Spawned> {
    info!(
        program = %spec.program,
        artifact = %spec.artifact.display(),
        username = %spec.credentials.username,
        "starting terminal process"
    );

    let mut child = spec
        .command()
        .spawn()
        .with_context(|| format!("spawning '{}' for {:?}", spec.program, spec.artifact))?;

    let Some(pid) = child.id() else {
        return Err(SupervisorError::Spawn(
            "process exited before its pid could be read".to_string(),
        ));
    };
    debug!(pid, "terminal process spawned");

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    Ok(Spawned {
        child,
        pid,
        stdin,
        stdout,
        stderr,
    })
}

/// The supervisor's exclusive handle on a running terminal.
pub struct ChildHandle {
    pub child: Child,
    pub pid: u32,
    pub stdin: Option<ChildStdin>,
    pub readers: Vec<JoinHandle<()>>,
    /// Distinguishes successive launches, so a late event from a previous
    /// child never touches the current one.
    pub generation: u64,
    pub started_at: Instant,
}

impl ChildHandle {
    pub fn new(
        child: Child,
        pid: u32,
        stdin: Option<ChildStdin>,
        readers: Vec<JoinHandle<()>>,
        generation: u64,
    ) -> Self {
        Self {
            child,
            pid,
            stdin,
            readers,
            generation,
            started_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("pid", &self.pid)
            .field("generation", &self.generation)
            .field("stdin_open", &self.stdin.is_some())
            .field("readers", &self.readers.len())
            .finish()
    }
}
