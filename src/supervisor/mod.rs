// src/supervisor/mod.rs

//! The process supervisor.
//!
//! Owns the terminal process for its whole lifetime:
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//! Idle -> (artifact missing) -> download in background -> Idle
//! ```
//!
//! [`Supervisor`] is a cheap, clonable handle. `start` and `stop` are
//! serialized by a lifecycle lock: a `start` that finds it taken is rejected,
//! a `stop` waits for it. The `running` / `downloading` flags are atomics so
//! pollers never block.

pub mod builder;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::process::shutdown::{self, ShutdownReport};
use crate::process::{
    ChildHandle, LaunchSpec, ProcessTable, Terminator, spawn_child, spawn_output_readers,
};
use crate::provision::Provisioner;
use crate::settings::SettingsStore;
use crate::sinks::Sinks;
use crate::types::{Credentials, DownloadProgress, Phase, RegionHost, RegionSettings, SupervisorState};

pub use builder::SupervisorBuilder;

/// After the last output stream closes, how long to wait for the process
/// itself to exit before concluding it is still alive.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Poll interval for a terminal that outlived its output streams.
const EXIT_POLL: Duration = Duration::from_millis(250);

/// Upper bound on the post-stop process sweep.
const SWEEP_BUDGET: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    settings: SettingsStore,
    provisioner: Arc<Provisioner>,
    sinks: Arc<Sinks>,
    terminator: Arc<dyn Terminator>,
    process_table: Arc<dyn ProcessTable>,
    phase: AtomicU8,
    auto_start: AtomicBool,
    generation: AtomicU64,
    child: Mutex<Option<ChildHandle>>,
    lifecycle: Mutex<()>,
}

/// Resets the phase to `Idle` however the owning scope is left.
struct IdleOnExit<'a> {
    inner: &'a Inner,
}

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.inner.set_phase(Phase::Idle);
    }
}

impl Supervisor {
    /// Supervisor with the production download source, terminator and
    /// process table.
    pub fn new(config: SupervisorConfig) -> crate::errors::Result<Self> {
        SupervisorBuilder::new(config).build()
    }

    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    pub fn provisioner(&self) -> &Arc<Provisioner> {
        &self.inner.provisioner
    }

    // ---- observers -------------------------------------------------------

    pub fn set_log_sink(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.sinks.set_log(Some(Arc::new(f)));
    }

    pub fn set_progress_sink(&self, f: impl Fn(DownloadProgress) + Send + Sync + 'static) {
        self.inner.sinks.set_progress(Some(Arc::new(f)));
    }

    pub fn set_download_complete_sink(&self, f: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.sinks.set_download_complete(Some(Arc::new(f)));
    }

    pub fn set_auto_start_sink(&self, f: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.sinks.set_auto_start(Some(Arc::new(f)));
    }

    pub fn clear_sinks(&self) {
        let sinks = &self.inner.sinks;
        sinks.set_log(None);
        sinks.set_progress(None);
        sinks.set_download_complete(None);
        sinks.set_auto_start(None);
    }

    // ---- state -----------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn is_downloading(&self) -> bool {
        self.inner.provisioner.is_downloading()
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState {
            running: self.is_running(),
            downloading: self.is_downloading(),
        }
    }

    /// Pid of the terminal, if one is owned.
    pub async fn pid(&self) -> Option<u32> {
        self.inner.child.lock().await.as_ref().map(|h| h.pid)
    }

    /// Whether a download triggered by `start` launches the terminal once it
    /// completes. Only affects downloads that begin after the call.
    pub fn set_auto_start_after_download(&self, enabled: bool) {
        self.inner.auto_start.store(enabled, Ordering::Release);
    }

    pub fn auto_start_after_download(&self) -> bool {
        self.inner.auto_start.load(Ordering::Acquire)
    }

    // ---- settings passthrough -------------------------------------------

    pub fn credentials(&self) -> Credentials {
        self.inner.settings.credentials()
    }

    pub fn region_settings(&self) -> RegionSettings {
        self.inner.settings.region_settings()
    }

    pub fn update_region_settings(&self, mdds: RegionHost, fpss: RegionHost) -> bool {
        let ok = self.inner.settings.update_region_settings(mdds, fpss);
        if ok {
            self.inner
                .sinks
                .info(&format!("Region settings saved (MDDS: {mdds}, FPSS: {fpss})."));
        } else {
            self.inner.sinks.info(
                "Region settings cached; the terminal's property file does not exist yet.",
            );
        }
        ok
    }

    // ---- lifecycle -------------------------------------------------------

    /// Start the terminal with the given credentials.
    ///
    /// Returns `true` only if a process was launched. If the artifact is
    /// missing, a background download is started and `false` is returned; with
    /// auto-start enabled the terminal is launched once the download
    /// succeeds, and the outcome is reported through the auto-start sink.
    pub async fn start(&self, username: &str, password: &str) -> bool {
        let inner = &self.inner;

        let Ok(_lifecycle) = inner.lifecycle.try_lock() else {
            inner
                .sinks
                .warn("Start rejected: another start or stop is in progress.");
            return false;
        };
        if inner.is_running() {
            inner.sinks.warn("Start rejected: the terminal is already running.");
            return false;
        }
        if inner.provisioner.is_downloading() {
            inner
                .sinks
                .warn("Start rejected: the terminal is still being downloaded.");
            return false;
        }

        let creds = Credentials::new(username, password);
        if let Err(e) = inner.settings.save_credentials(&creds) {
            inner.sinks.warn(&format!("Error saving credentials: {e}"));
        }

        if !inner.provisioner.ensure_present() {
            inner.sinks.info(&format!(
                "{} not found; downloading it first.",
                inner.config.artifact_file_name()
            ));
            inner.begin_download();
            return false;
        }

        inner.launch(&creds).await
    }

    /// Download the artifact in the foreground, without launching anything.
    pub async fn download(&self) -> bool {
        self.inner.provisioner.download().await
    }

    /// Stop the terminal.
    ///
    /// Returns `false` only if nothing was running. Otherwise returns `true`
    /// once the stop procedure completed; `is_running()` is `false`
    /// afterwards even if no termination stage could confirm the exit.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let Some(mut handle) = inner.child.lock().await.take() else {
            inner.set_phase(Phase::Idle);
            inner.sinks.warn("Stop requested but the terminal is not running.");
            return false;
        };
        let _idle = IdleOnExit { inner };
        inner.set_phase(Phase::Stopping);
        inner.sinks.info(&format!("Stopping terminal (pid {}).", handle.pid));

        // Once the terminal is reaped its orphans are reparented, so the
        // tree has to be recorded while it is still intact.
        let descendants = inner.snapshot_descendants(handle.pid).await;

        let report = shutdown::run_stop_sequence(
            &mut handle,
            &inner.config.shutdown,
            inner.terminator.as_ref(),
            &inner.sinks,
        )
        .await;
        shutdown::close_streams(&mut handle, true).await;

        let pid = handle.pid;
        drop(handle);
        inner.set_phase(Phase::Idle);
        inner.report_stopped(&report);

        inner.sweep(pid, descendants).await;
        true
    }

    /// Abbreviated stop for teardown paths that cannot wait: skips the
    /// cooperative and signal stages and kills the process tree right away,
    /// within `shutdown.abort_budget`.
    pub async fn abort(&self) -> bool {
        let inner = &self.inner;
        let budget = inner.config.shutdown.abort_budget;

        let Ok(_lifecycle) = timeout(budget, inner.lifecycle.lock()).await else {
            warn!("abort: a stop sequence is already in progress");
            return false;
        };
        let Some(mut handle) = inner.child.lock().await.take() else {
            return false;
        };
        let _idle = IdleOnExit { inner };
        inner.set_phase(Phase::Stopping);

        let report = shutdown::run_abort_sequence(
            &mut handle,
            &inner.config.shutdown,
            inner.terminator.as_ref(),
            &inner.sinks,
        )
        .await;
        shutdown::close_streams(&mut handle, false).await;
        drop(handle);
        inner.set_phase(Phase::Idle);
        inner.report_stopped(&report);
        true
    }

    /// Graceful teardown for the owner's shutdown path: stops the terminal if
    /// one is running and detaches all observers.
    pub async fn shutdown(&self) {
        if self.is_running() {
            self.stop().await;
        }
        self.clear_sinks();
    }
}

impl Inner {
    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn is_running(&self) -> bool {
        matches!(self.phase(), Phase::Running | Phase::Stopping)
    }

    fn set_phase(&self, next: Phase) {
        let prev = Phase::from_u8(self.phase.swap(next as u8, Ordering::AcqRel));
        if prev != next {
            debug!(from = ?prev, to = ?next, "supervisor phase transition");
        }
    }

    fn begin_download(self: &Arc<Self>) {
        let auto_start = self.auto_start.load(Ordering::Acquire);
        let Some(download) = self.provisioner.download_async() else {
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(self);
        let settle = self.config.settle_delay;
        tokio::spawn(async move {
            // The completion sink has fired by the time the task resolves.
            let ok = download.await.unwrap_or(false);
            if !(ok && auto_start) {
                return;
            }
            sleep(settle).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let started = inner.auto_start_after_download().await;
            inner.sinks.auto_start_complete(started);
        });
    }

    async fn auto_start_after_download(self: &Arc<Self>) -> bool {
        let Ok(_lifecycle) = self.lifecycle.try_lock() else {
            self.sinks
                .warn("Auto-start skipped: another start or stop is in progress.");
            return false;
        };
        if self.is_running() {
            self.sinks
                .warn("Auto-start skipped: the terminal is already running.");
            return false;
        }
        if !self.provisioner.ensure_present() {
            self.sinks
                .warn("Auto-start failed: the terminal artifact is still missing.");
            return false;
        }

        self.sinks.info("Download finished; starting terminal automatically.");
        let creds = self.settings.credentials();
        self.launch(&creds).await
    }

    /// Spawn the child and its readers. Caller holds the lifecycle lock.
    async fn launch(self: &Arc<Self>, creds: &Credentials) -> bool {
        self.set_phase(Phase::Starting);

        let spec = LaunchSpec {
            program: self.config.program.clone(),
            args: self.config.program_args.clone(),
            artifact: self.config.artifact_path.clone(),
            credentials: creds.clone(),
        };

        let spawned = match spawn_child(&spec) {
            Ok(s) => s,
            Err(e) => {
                self.set_phase(Phase::Idle);
                self.sinks.warn(&format!("Error starting terminal: {e}"));
                return false;
            }
        };

        let pid = spawned.pid;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let readers = spawn_output_readers(spawned.stdout, spawned.stderr, Arc::clone(&self.sinks));
        let handle = ChildHandle::new(spawned.child, pid, spawned.stdin, readers.handles, generation);

        *self.child.lock().await = Some(handle);
        self.set_phase(Phase::Running);

        tokio::spawn(watch_output_end(Arc::downgrade(self), generation, readers.closed));

        self.sinks.info(&format!("Terminal started (pid {pid})."));
        true
    }

    /// Check whether the terminal of `generation` has exited, waiting up to
    /// `wait`. On exit the handle is released and the phase reset.
    ///
    /// Returns `false` only while that terminal is still owned and alive.
    async fn reap_if_exited(&self, generation: u64, wait: Duration) -> bool {
        let mut slot = self.child.lock().await;
        let Some(handle) = slot.as_mut() else {
            return true;
        };
        if handle.generation != generation {
            return true;
        }

        let exited = match handle.child.try_wait() {
            Ok(Some(status)) => Ok(status),
            Ok(None) if wait.is_zero() => return false,
            Ok(None) => match timeout(wait, handle.child.wait()).await {
                Ok(res) => res,
                Err(_) => return false,
            },
            Err(e) => Err(e),
        };
        let status = match exited {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "waiting for terminal after its output closed failed");
                return true;
            }
        };

        let uptime = handle.started_at.elapsed();
        slot.take();
        drop(slot);
        if self
            .phase
            .compare_exchange(
                Phase::Running as u8,
                Phase::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            debug!(from = ?Phase::Running, to = ?Phase::Idle, "supervisor phase transition");
        }
        info!(%status, uptime_ms = uptime.as_millis() as u64, "terminal exited on its own");
        self.sinks.log(&format!("Terminal exited ({status})."));
        true
    }

    fn report_stopped(&self, report: &ShutdownReport) {
        let ms = report.elapsed.as_millis();
        match report.exited_after {
            Some(stage) => self
                .sinks
                .info(&format!("Terminal stopped after {ms}ms ({stage} stage).")),
            None => self.sinks.warn(&format!(
                "Stop procedure finished after {ms}ms, but the terminal's exit could not be confirmed."
            )),
        }
    }

    async fn snapshot_descendants(&self, pid: u32) -> Vec<u32> {
        let table = Arc::clone(&self.process_table);
        let task = tokio::task::spawn_blocking(move || table.find_processes_by_ancestor(pid));
        match timeout(SWEEP_BUDGET, task).await {
            Ok(Ok(found)) => {
                debug!(pid, count = found.len(), "recorded terminal process tree");
                found
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "recording terminal process tree failed");
                Vec::new()
            }
            Err(_) => {
                warn!(pid, "recording terminal process tree timed out");
                Vec::new()
            }
        }
    }

    async fn sweep(&self, pid: u32, descendants: Vec<u32>) {
        let table = Arc::clone(&self.process_table);
        let sinks = Arc::clone(&self.sinks);
        let artifact = self.config.artifact_file_name();

        let task = tokio::task::spawn_blocking(move || {
            shutdown::sweep(table.as_ref(), pid, &descendants, &artifact, &sinks)
        });
        match timeout(SWEEP_BUDGET, task).await {
            Ok(Ok(killed)) => debug!(pid, killed, "post-stop sweep finished"),
            Ok(Err(e)) => warn!(pid, error = %e, "post-stop sweep task failed"),
            Err(_) => warn!(pid, "post-stop sweep still running; leaving it in the background"),
        }
    }
}

async fn watch_output_end(inner: Weak<Inner>, generation: u64, mut closed: mpsc::Receiver<()>) {
    // Yields `None` once every reader task has dropped its sender.
    while closed.recv().await.is_some() {}

    let Some(strong) = inner.upgrade() else {
        return;
    };
    if strong.reap_if_exited(generation, EXIT_GRACE).await {
        return;
    }
    // Output gone but the process lives on (it closed its streams, or a
    // grandchild holds them): keep polling until it exits or is stopped.
    strong
        .sinks
        .warn("Terminal output closed but the process is still running.");
    drop(strong);

    loop {
        sleep(EXIT_POLL).await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        if strong.reap_if_exited(generation, Duration::ZERO).await {
            return;
        }
    }
}

impl Drop for Inner {
    /// Last handle gone with a terminal still owned: kill its process tree
    /// without waiting. The child itself is also killed on drop.
    fn drop(&mut self) {
        if let Some(handle) = self.child.get_mut().as_mut() {
            if let Err(e) = self.terminator.kill_tree(handle.pid) {
                warn!(pid = handle.pid, error = %e, "failed to kill terminal on supervisor drop");
            }
            for reader in &handle.readers {
                reader.abort();
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("phase", &self.phase())
            .field("downloading", &self.is_downloading())
            .field("artifact", &self.inner.config.artifact_path)
            .finish()
    }
}
