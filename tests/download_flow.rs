// tests/download_flow.rs

mod common;
use crate::common::{BytesSource, LogCapture, TerminalFixture, eventually, init_tracing, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use terminal_supervisor::types::DownloadProgress;

type TestResult = Result<(), Box<dyn Error>>;

fn record_progress(supervisor: &terminal_supervisor::Supervisor) -> Arc<Mutex<Vec<DownloadProgress>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    supervisor.set_progress_sink(move |p| sink.lock().unwrap().push(p));
    seen
}

fn record_completion(supervisor: &terminal_supervisor::Supervisor) -> Arc<Mutex<Vec<bool>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    supervisor.set_download_complete_sink(move |ok| sink.lock().unwrap().push(ok));
    seen
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_full_size() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("progress");
    let payload = vec![7u8; 1000];
    let supervisor = fx
        .config()
        .supervisor()
        .artifact_source(Arc::new(BytesSource::new(payload.clone()).chunk_size(64)))
        .build()?;
    let progress = record_progress(&supervisor);
    let completions = record_completion(&supervisor);

    assert!(with_timeout(supervisor.download()).await);

    let progress = progress.lock().unwrap().clone();
    assert!(progress.len() > 2);
    assert!(
        progress.windows(2).all(|w| w[0].percentage <= w[1].percentage),
        "percentages regressed: {progress:?}"
    );
    assert!(progress[..progress.len() - 1].iter().all(|p| p.percentage < 100));
    assert_eq!(
        progress.last().copied(),
        Some(DownloadProgress {
            percentage: 100,
            downloaded: 1000,
            total: 1000,
        })
    );

    assert_eq!(*completions.lock().unwrap(), vec![true]);
    assert!(!supervisor.is_downloading());
    assert_eq!(std::fs::read(fx.artifact_path())?, payload);
    Ok(())
}

#[tokio::test]
async fn unknown_length_still_finishes_at_full_size() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("no-length");
    let supervisor = fx
        .config()
        .supervisor()
        .artifact_source(Arc::new(BytesSource::new(vec![1u8; 300]).without_length()))
        .build()?;
    let progress = record_progress(&supervisor);

    assert!(with_timeout(supervisor.download()).await);

    let progress = progress.lock().unwrap().clone();
    assert_eq!(progress.last().map(|p| (p.percentage, p.downloaded, p.total)), Some((100, 300, 300)));
    Ok(())
}

#[tokio::test]
async fn failed_download_clears_flag_and_reports_once() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("fail");
    let supervisor = fx
        .config()
        .supervisor()
        .artifact_source(Arc::new(BytesSource::new(vec![0u8; 512]).failing_after(128)))
        .build()?;
    let logs = LogCapture::attach(&supervisor);
    let progress = record_progress(&supervisor);
    let completions = record_completion(&supervisor);

    assert!(!with_timeout(supervisor.download()).await);

    assert!(!supervisor.is_downloading());
    assert_eq!(*completions.lock().unwrap(), vec![false]);
    assert!(progress.lock().unwrap().iter().all(|p| p.percentage < 100));
    assert!(logs.contains("Error downloading"));
    assert!(!fx.artifact_path().exists(), "no partial artifact left in place");
    Ok(())
}

#[tokio::test]
async fn second_download_while_in_flight_is_ignored() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("single-flight");
    let source = Arc::new(
        BytesSource::new(vec![0u8; 256])
            .chunk_size(32)
            .chunk_delay(Duration::from_millis(20)),
    );
    let supervisor = fx.config().supervisor().artifact_source(source.clone()).build()?;
    let completions = record_completion(&supervisor);

    let provisioner = supervisor.provisioner().clone();
    let first = provisioner.download_async().expect("first download starts");
    assert!(supervisor.is_downloading(), "flag is set before the task runs");
    assert!(provisioner.download_async().is_none());
    assert!(!supervisor.download().await);

    assert!(with_timeout(first).await?);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(*completions.lock().unwrap(), vec![true]);
    Ok(())
}

#[tokio::test]
async fn start_rejected_while_downloading() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("busy");
    let source = BytesSource::new(vec![0u8; 256])
        .chunk_size(16)
        .chunk_delay(Duration::from_millis(20));
    let supervisor = fx
        .config()
        .auto_start(false)
        .supervisor()
        .artifact_source(Arc::new(source))
        .build()?;
    let logs = LogCapture::attach(&supervisor);

    assert!(!supervisor.start("u", "p").await);
    assert!(supervisor.is_downloading());
    assert!(!supervisor.start("u", "p").await);
    assert!(logs.contains("still being downloaded"));

    let s = supervisor.clone();
    assert!(eventually(Duration::from_secs(5), move || !s.is_downloading()).await);
    assert!(!supervisor.is_running(), "auto-start was disabled");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn missing_artifact_is_downloaded_then_started() -> TestResult {
    use crate::common::scripts;

    init_tracing();
    let fx = TerminalFixture::new("auto-start");
    let supervisor = fx
        .config()
        .supervisor()
        .artifact_source(Arc::new(
            BytesSource::new(scripts::COOPERATIVE.as_bytes()).chunk_size(16),
        ))
        .build()?;
    let logs = LogCapture::attach(&supervisor);
    let progress = record_progress(&supervisor);

    let auto_started = Arc::new(Mutex::new(None));
    {
        let auto_started = Arc::clone(&auto_started);
        supervisor.set_auto_start_sink(move |ok| *auto_started.lock().unwrap() = Some(ok));
    }

    assert!(!supervisor.start("u", "p").await, "nothing launched yet");
    assert!(logs.contains("Download started"));

    let flag = Arc::clone(&auto_started);
    assert!(eventually(Duration::from_secs(5), move || flag.lock().unwrap().is_some()).await);
    assert_eq!(*auto_started.lock().unwrap(), Some(true));
    assert_eq!(progress.lock().unwrap().last().map(|p| p.percentage), Some(100));

    assert!(supervisor.is_running());
    assert!(logs.wait_for("terminal up as u", Duration::from_secs(3)).await);

    assert!(with_timeout(supervisor.stop()).await);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn failed_download_does_not_auto_start() -> TestResult {
    init_tracing();
    let fx = TerminalFixture::new("auto-start-fail");
    let supervisor = fx
        .config()
        .supervisor()
        .artifact_source(Arc::new(BytesSource::new(vec![0u8; 64]).failing_after(0)))
        .build()?;
    let completions = record_completion(&supervisor);
    let auto_started = Arc::new(Mutex::new(None));
    {
        let auto_started = Arc::clone(&auto_started);
        supervisor.set_auto_start_sink(move |ok| *auto_started.lock().unwrap() = Some(ok));
    }

    assert!(!supervisor.start("u", "p").await);
    let seen = Arc::clone(&completions);
    assert!(eventually(Duration::from_secs(3), move || !seen.lock().unwrap().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(*completions.lock().unwrap(), vec![false]);
    assert_eq!(*auto_started.lock().unwrap(), None);
    assert!(!supervisor.is_running());
    Ok(())
}
