// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod process;
pub mod provision;
pub mod settings;
pub mod sinks;
pub mod supervisor;
pub mod types;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, RunArgs, SetRegionsArgs};
use crate::config::{SupervisorConfig, load_or_default};
use crate::settings::SettingsStore;
use crate::types::DownloadProgress;

pub use crate::supervisor::{Supervisor, SupervisorBuilder};

/// How often the headless host polls the supervisor state.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// High-level entry point used by `main.rs`.
///
/// This is a headless stand-in for a UI: it wires the supervisor's sinks to
/// the terminal (stdout for log lines, stderr for download progress), issues
/// the requested command, and on Ctrl-C runs the stop sequence.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    match args.command.clone().unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(run_args) => run_terminal(cfg, run_args).await,
        Command::Download => download_only(cfg).await,
        Command::Regions => {
            print_regions(&SettingsStore::from_config(&cfg));
            Ok(())
        }
        Command::SetRegions(regions) => set_regions(&cfg, &regions),
    }
}

fn attach_console_sinks(supervisor: &Supervisor) {
    supervisor.set_log_sink(|line| println!("{line}"));

    let last_pct = Arc::new(std::sync::atomic::AtomicU8::new(u8::MAX));
    supervisor.set_progress_sink(move |p: DownloadProgress| {
        // Only redraw when the percentage changes.
        if last_pct.swap(p.percentage, Ordering::AcqRel) == p.percentage {
            return;
        }
        let mut err = std::io::stderr();
        let _ = if p.total > 0 {
            write!(err, "\rDownloading: {:>3}% ({}/{} bytes)", p.percentage, p.downloaded, p.total)
        } else {
            write!(err, "\rDownloading: {} bytes", p.downloaded)
        };
        let _ = err.flush();
    });

    supervisor.set_download_complete_sink(|ok| {
        eprintln!();
        debug!(success = ok, "download finished");
    });
}

async fn run_terminal(cfg: SupervisorConfig, args: RunArgs) -> Result<()> {
    let supervisor = Supervisor::new(cfg)?;
    attach_console_sinks(&supervisor);
    if args.no_auto_start {
        supervisor.set_auto_start_after_download(false);
    }

    let stored = supervisor.credentials();
    let username = args.username.unwrap_or(stored.username);
    let password = args.password.unwrap_or(stored.password);
    if username.is_empty() {
        bail!("no username given and none stored; pass --username and --password");
    }

    // Still waiting for the launch that follows a download.
    let awaiting_auto_start = Arc::new(AtomicBool::new(
        !supervisor.provisioner().ensure_present() && supervisor.auto_start_after_download(),
    ));
    {
        let waiting = Arc::clone(&awaiting_auto_start);
        supervisor.set_auto_start_sink(move |ok| {
            waiting.store(false, Ordering::Release);
            info!(success = ok, "automatic start after download finished");
        });
        let waiting = Arc::clone(&awaiting_auto_start);
        supervisor.set_download_complete_sink(move |ok| {
            eprintln!();
            if !ok {
                waiting.store(false, Ordering::Release);
            }
        });
    }

    if supervisor.start(&username, &password).await {
        awaiting_auto_start.store(false, Ordering::Release);
    } else if !supervisor.is_downloading() && !awaiting_auto_start.load(Ordering::Acquire) {
        bail!("terminal failed to start");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                info!("Ctrl-C received; stopping terminal");
                break;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if supervisor.is_running()
                    || supervisor.is_downloading()
                    || awaiting_auto_start.load(Ordering::Acquire)
                {
                    continue;
                }
                info!("terminal is no longer running");
                break;
            }
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

async fn download_only(cfg: SupervisorConfig) -> Result<()> {
    let supervisor = Supervisor::new(cfg)?;
    attach_console_sinks(&supervisor);

    if supervisor.provisioner().ensure_present() {
        println!(
            "{} already present.",
            supervisor.config().artifact_path.display()
        );
        return Ok(());
    }
    if !supervisor.download().await {
        bail!("download failed");
    }
    Ok(())
}

fn print_regions(store: &SettingsStore) {
    let regions = store.region_settings();
    println!("property file: {}", store.region_path().display());
    println!("  MDDS_REGION = {}", types::RegionKey::Mdds.token(regions.mdds));
    println!("  FPSS_REGION = {}", types::RegionKey::Fpss.token(regions.fpss));
}

fn set_regions(cfg: &SupervisorConfig, args: &SetRegionsArgs) -> Result<()> {
    let store = SettingsStore::from_config(cfg);
    if !store.update_region_settings(args.mdds, args.fpss) {
        bail!(
            "could not update {}; start the terminal once so it creates the file",
            store.region_path().display()
        );
    }
    print_regions(&store);
    Ok(())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &SupervisorConfig) {
    println!("terminal-supervisor dry-run");
    println!("  artifact: {}", cfg.artifact_path.display());
    println!("  download url: {}", cfg.download_url);
    println!(
        "  launch: {} {} <artifact> <username> <password>",
        cfg.program,
        cfg.program_args.join(" ")
    );
    println!("  credentials file: {}", cfg.credentials_file.display());
    println!("  region file: {}", cfg.region_file.display());
    println!(
        "  auto start after download: {} (settle {}ms)",
        cfg.auto_start,
        cfg.settle_delay.as_millis()
    );
    let s = &cfg.shutdown;
    println!(
        "  shutdown: deadline {}ms, token wait {}ms, signal wait {}ms, kill wait {}ms, abort budget {}ms",
        s.deadline.as_millis(),
        s.token_wait.as_millis(),
        s.signal_wait.as_millis(),
        s.kill_wait.as_millis(),
        s.abort_budget.as_millis()
    );
    println!("  quit tokens: {:?}", s.quit_tokens);

    debug!("dry-run complete (no execution)");
}
