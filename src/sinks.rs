// src/sinks.rs

//! Single-slot observer registrations.
//!
//! The embedding application (a UI, or the CLI host in `lib.rs`) registers at
//! most one callback per kind; registering again replaces the previous one.
//! Callers that need several observers fan out themselves.
//!
//! Every notification takes a snapshot of the slot before invoking it, so
//! swapping or clearing a slot while a notification is in flight is safe.
//! A panicking callback is caught here and logged; it never unwinds into the
//! supervisor's state machine.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info, warn};

use crate::types::DownloadProgress;

pub type LogFn = dyn Fn(&str) + Send + Sync;
pub type ProgressFn = dyn Fn(DownloadProgress) + Send + Sync;
/// Receives `true` when the download succeeded.
pub type DownloadCompleteFn = dyn Fn(bool) + Send + Sync;
/// Receives `true` when the automatic start after a download launched the
/// terminal.
pub type AutoStartFn = dyn Fn(bool) + Send + Sync;

struct Slot<F: ?Sized> {
    inner: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> Slot<F> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    fn set(&self, f: Option<Arc<F>>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = f;
    }

    fn snapshot(&self) -> Option<Arc<F>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn invoke_guarded(kind: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(sink = kind, "observer callback panicked; notification dropped");
    }
}

pub struct Sinks {
    log: Slot<LogFn>,
    progress: Slot<ProgressFn>,
    download_complete: Slot<DownloadCompleteFn>,
    auto_start: Slot<AutoStartFn>,
}

impl Default for Sinks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("log", &self.log.snapshot().is_some())
            .field("progress", &self.progress.snapshot().is_some())
            .field("download_complete", &self.download_complete.snapshot().is_some())
            .field("auto_start", &self.auto_start.snapshot().is_some())
            .finish()
    }
}

impl Sinks {
    pub fn new() -> Self {
        Self {
            log: Slot::new(),
            progress: Slot::new(),
            download_complete: Slot::new(),
            auto_start: Slot::new(),
        }
    }

    pub fn set_log(&self, f: Option<Arc<LogFn>>) {
        self.log.set(f);
    }

    pub fn set_progress(&self, f: Option<Arc<ProgressFn>>) {
        self.progress.set(f);
    }

    pub fn set_download_complete(&self, f: Option<Arc<DownloadCompleteFn>>) {
        self.download_complete.set(f);
    }

    pub fn set_auto_start(&self, f: Option<Arc<AutoStartFn>>) {
        self.auto_start.set(f);
    }

    /// Forward a raw line to the log sink.
    pub fn log(&self, line: &str) {
        if let Some(f) = self.log.snapshot() {
            invoke_guarded("log", || f(line));
        }
    }

    /// Supervisor message at info level: traced and forwarded.
    pub fn info(&self, line: &str) {
        info!("{line}");
        self.log(line);
    }

    /// Supervisor message at warn level: traced and forwarded.
    pub fn warn(&self, line: &str) {
        warn!("{line}");
        self.log(line);
    }

    /// One line of terminal output.
    pub fn child_line(&self, line: &str) {
        debug!(target: "terminal_supervisor::child", "{line}");
        self.log(line);
    }

    pub fn progress(&self, progress: DownloadProgress) {
        if let Some(f) = self.progress.snapshot() {
            invoke_guarded("progress", || f(progress));
        }
    }

    pub fn download_complete(&self, success: bool) {
        if let Some(f) = self.download_complete.snapshot() {
            invoke_guarded("download_complete", || f(success));
        }
    }

    pub fn auto_start_complete(&self, success: bool) {
        if let Some(f) = self.auto_start.snapshot() {
            invoke_guarded("auto_start", || f(success));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn empty_slots_are_noops() {
        let sinks = Sinks::new();
        sinks.log("nobody listens");
        sinks.progress(DownloadProgress::default());
        sinks.download_complete(true);
        sinks.auto_start_complete(false);
    }

    #[test]
    fn setting_a_slot_replaces_the_previous_observer() {
        let sinks = Sinks::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let first = Arc::clone(&seen);
        sinks.set_log(Some(Arc::new(move |l: &str| {
            first.lock().unwrap().push(format!("first:{l}"))
        })));
        sinks.log("a");

        let second = Arc::clone(&seen);
        sinks.set_log(Some(Arc::new(move |l: &str| {
            second.lock().unwrap().push(format!("second:{l}"))
        })));
        sinks.log("b");

        assert_eq!(*seen.lock().unwrap(), vec!["first:a", "second:b"]);
    }

    #[test]
    fn panicking_observer_is_contained() {
        let sinks = Sinks::new();
        sinks.set_download_complete(Some(Arc::new(|_| panic!("observer bug"))));
        sinks.download_complete(true);

        // The slot is still usable afterwards.
        let hit = Arc::new(Mutex::new(false));
        let h = Arc::clone(&hit);
        sinks.set_download_complete(Some(Arc::new(move |ok| *h.lock().unwrap() = ok)));
        sinks.download_complete(true);
        assert!(*hit.lock().unwrap());
    }

    #[test]
    fn observer_may_replace_its_own_slot() {
        let sinks = Arc::new(Sinks::new());
        let s = Arc::clone(&sinks);
        sinks.set_log(Some(Arc::new(move |_l: &str| s.set_log(None))));
        sinks.log("first");
        sinks.log("second");
    }
}
