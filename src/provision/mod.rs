// src/provision/mod.rs

//! Artifact provisioner.
//!
//! Makes sure the terminal binary exists locally and fetches it when it does
//! not. At most one download is in flight at a time; the `downloading` flag
//! is claimed synchronously so callers polling right after
//! [`Provisioner::download_async`] already see it set.
//!
//! - [`source`] abstracts where the bytes come from (HTTP in production).
//! - [`progress`] computes the progress reports handed to the sink.

pub mod progress;
pub mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::sinks::Sinks;

pub use progress::ProgressTracker;
pub use source::{ArtifactSource, ChunkCallback, HttpArtifactSource};

pub struct Provisioner {
    artifact_path: PathBuf,
    source: Arc<dyn ArtifactSource>,
    downloading: AtomicBool,
    sinks: Arc<Sinks>,
}

/// Claim on the `downloading` flag.
///
/// Completing it (or dropping it, e.g. if the download task panics) clears
/// the flag and fires the completion sink exactly once.
struct InFlight {
    owner: Arc<Provisioner>,
    finished: bool,
}

impl InFlight {
    fn finish(mut self, success: bool) {
        self.finished = true;
        self.owner.complete(success);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            self.owner.complete(false);
        }
    }
}

impl Provisioner {
    pub fn new(
        artifact_path: impl Into<PathBuf>,
        source: Arc<dyn ArtifactSource>,
        sinks: Arc<Sinks>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            source,
            downloading: AtomicBool::new(false),
            sinks,
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Is the artifact present on disk?
    pub fn ensure_present(&self) -> bool {
        self.artifact_path.is_file()
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    /// Download the artifact and wait for the result.
    ///
    /// Returns `false` if the download failed or another one was already in
    /// flight.
    pub async fn download(self: &Arc<Self>) -> bool {
        let Some(claim) = self.begin() else {
            return false;
        };
        self.execute(claim).await
    }

    /// Start a background download.
    ///
    /// Returns `None` (and does nothing) if a download is already in flight.
    pub fn download_async(self: &Arc<Self>) -> Option<JoinHandle<bool>> {
        let claim = self.begin()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.execute(claim).await }))
    }

    fn begin(self: &Arc<Self>) -> Option<InFlight> {
        if self
            .downloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(path = %self.artifact_path.display(), "download already in flight; ignoring request");
            return None;
        }
        Some(InFlight {
            owner: Arc::clone(self),
            finished: false,
        })
    }

    fn complete(&self, success: bool) {
        self.downloading.store(false, Ordering::Release);
        self.sinks.download_complete(success);
    }

    async fn execute(&self, claim: InFlight) -> bool {
        let name = self.artifact_display_name();
        self.sinks.info(&format!(
            "Download started: {} from {}",
            name,
            self.source.describe()
        ));

        match self.fetch_into_place().await {
            Ok(bytes) => {
                self.sinks.info(&format!(
                    "Download of {name} completed successfully ({bytes} bytes)."
                ));
                claim.finish(true);
                true
            }
            Err(e) => {
                self.sinks.warn(&format!("Error downloading {name}: {e}"));
                claim.finish(false);
                false
            }
        }
    }

    /// Fetch into `<artifact>.part`, then rename over the artifact path so a
    /// partial file is never mistaken for the artifact.
    async fn fetch_into_place(&self) -> crate::errors::Result<u64> {
        if let Some(parent) = self.artifact_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let part = self.part_path();
        let sinks = Arc::clone(&self.sinks);
        let mut tracker = ProgressTracker::default();

        let fetched = {
            let mut on_chunk = |downloaded: u64, total: Option<u64>| {
                sinks.progress(tracker.update(downloaded, total));
            };
            self.source.fetch(&part, &mut on_chunk).await
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part, &self.artifact_path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }

        self.sinks.progress(tracker.finish(bytes));
        Ok(bytes)
    }

    fn part_path(&self) -> PathBuf {
        let mut name = self
            .artifact_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        self.artifact_path.with_file_name(name)
    }

    fn artifact_display_name(&self) -> String {
        self.artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.artifact_path.display().to_string())
    }
}
