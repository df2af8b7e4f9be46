//! In-process stand-ins for the supervisor's platform seams.
#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use terminal_supervisor::errors::{Result, SupervisorError};
use terminal_supervisor::process::{OsTerminator, ProcessTable, Terminator};
use terminal_supervisor::provision::{ArtifactSource, ChunkCallback};

/// Serves a fixed byte payload in fixed-size chunks.
pub struct BytesSource {
    data: Vec<u8>,
    chunk: usize,
    announce_length: bool,
    chunk_delay: Duration,
    /// Fail once this many bytes have been written (or at the end).
    fail_after: Option<usize>,
    pub fetches: AtomicUsize,
}

impl BytesSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            chunk: 64,
            announce_length: true,
            chunk_delay: Duration::ZERO,
            fail_after: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn chunk_size(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn without_length(mut self) -> Self {
        self.announce_length = false;
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for BytesSource {
    fn describe(&self) -> String {
        "test bytes".to_string()
    }

    fn fetch<'a>(
        &'a self,
        dest: &'a Path,
        on_chunk: ChunkCallback<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let total = self.announce_length.then_some(self.data.len() as u64);
            let mut file = tokio::fs::File::create(dest).await?;
            let mut written = 0usize;

            for piece in self.data.chunks(self.chunk) {
                if let Some(limit) = self.fail_after {
                    if written >= limit {
                        return Err(SupervisorError::Download("connection reset".into()));
                    }
                }
                if !self.chunk_delay.is_zero() {
                    tokio::time::sleep(self.chunk_delay).await;
                }
                file.write_all(piece).await?;
                written += piece.len();
                on_chunk(written as u64, total);
            }
            if self.fail_after.is_some() {
                return Err(SupervisorError::Download("connection reset".into()));
            }
            file.flush().await?;
            Ok(written as u64)
        })
    }
}

/// Which stages of an [`OsTerminator`] should report failure without doing
/// anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageFailures {
    pub terminate: bool,
    pub kill_tree: bool,
    pub system_kill: bool,
}

/// Wraps the real terminator, recording calls and failing chosen stages.
#[derive(Default)]
pub struct FlakyTerminator {
    inner: OsTerminator,
    failures: StageFailures,
    calls: Mutex<Vec<&'static str>>,
}

impl FlakyTerminator {
    pub fn new(failures: StageFailures) -> Self {
        Self {
            inner: OsTerminator,
            failures,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, stage: &'static str) {
        self.calls.lock().unwrap().push(stage);
    }
}

fn refused(stage: &str) -> io::Error {
    io::Error::other(format!("{stage} disabled by test"))
}

impl Terminator for FlakyTerminator {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.record("terminate");
        if self.failures.terminate {
            return Err(refused("terminate"));
        }
        self.inner.terminate(pid)
    }

    fn kill_tree(&self, pid: u32) -> io::Result<()> {
        self.record("kill_tree");
        if self.failures.kill_tree {
            return Err(refused("kill_tree"));
        }
        self.inner.kill_tree(pid)
    }

    fn system_kill(&self, pid: u32) -> io::Result<()> {
        self.record("system_kill");
        if self.failures.system_kill {
            return Err(refused("system_kill"));
        }
        self.inner.system_kill(pid)
    }
}

/// Process table that sees nothing, so tests never kill unrelated processes.
/// Records the queries it receives.
#[derive(Default)]
pub struct QuietProcessTable {
    pub ancestor_queries: Mutex<Vec<u32>>,
    pub command_queries: Mutex<Vec<String>>,
}

impl ProcessTable for QuietProcessTable {
    fn find_processes_by_ancestor(&self, pid: u32) -> Vec<u32> {
        self.ancestor_queries.lock().unwrap().push(pid);
        Vec::new()
    }

    fn find_processes_by_command_substring(&self, text: &str) -> Vec<u32> {
        self.command_queries.lock().unwrap().push(text.to_string());
        Vec::new()
    }

    fn process_exists(&self, _pid: u32) -> bool {
        false
    }

    fn force_kill(&self, _pid: u32) -> io::Result<()> {
        Ok(())
    }
}
