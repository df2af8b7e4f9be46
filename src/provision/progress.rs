// src/provision/progress.rs

use crate::types::DownloadProgress;

/// Turns raw `(downloaded, total)` transport callbacks into
/// [`DownloadProgress`] reports.
///
/// While bytes are still arriving the percentage is capped at 99 and never
/// decreases; only [`ProgressTracker::finish`] reports 100, once the artifact
/// is in place.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_percentage: u8,
}

impl ProgressTracker {
    pub fn update(&mut self, downloaded: u64, total: Option<u64>) -> DownloadProgress {
        let total = total.unwrap_or(0);
        let pct = if total > 0 {
            (downloaded.saturating_mul(100) / total).min(99) as u8
        } else {
            0
        };
        self.last_percentage = self.last_percentage.max(pct);

        DownloadProgress {
            percentage: self.last_percentage,
            downloaded,
            total,
        }
    }

    pub fn finish(&mut self, bytes: u64) -> DownloadProgress {
        self.last_percentage = 100;
        DownloadProgress {
            percentage: 100,
            downloaded: bytes,
            total: bytes,
        }
    }
}
