// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::types::RegionHost;

/// Command-line arguments for `terminal-supervisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "terminal-supervisor",
    version,
    about = "Download, run and supervise the Theta Terminal process.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `TerminalSupervisor.toml` in the current working directory.
    /// A missing file means built-in defaults.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path(), global = true)]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TERMINAL_SUPERVISOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Print the effective configuration and exit.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the terminal and supervise it until Ctrl-C (default).
    Run(RunArgs),

    /// Download the terminal artifact without starting it.
    Download,

    /// Print the region settings read from the terminal's property file.
    Regions,

    /// Update the region settings in the terminal's property file.
    SetRegions(SetRegionsArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Username; defaults to the stored credentials.
    #[arg(long)]
    pub username: Option<String>,

    /// Password; defaults to the stored credentials.
    #[arg(long)]
    pub password: Option<String>,

    /// Do not launch the terminal automatically after downloading it.
    #[arg(long)]
    pub no_auto_start: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SetRegionsArgs {
    /// MDDS host group (nj, stage, dev).
    #[arg(long, value_parser = parse_region_host)]
    pub mdds: RegionHost,

    /// FPSS host group (nj, stage, dev).
    #[arg(long, value_parser = parse_region_host)]
    pub fpss: RegionHost,
}

fn parse_region_host(s: &str) -> Result<RegionHost, String> {
    s.parse()
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let args = CliArgs::try_parse_from(["terminal-supervisor"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.config, default_config_path());
        assert_eq!(args.config, PathBuf::from("TerminalSupervisor.toml"));
    }

    #[test]
    fn parses_set_regions() {
        let args = CliArgs::try_parse_from([
            "terminal-supervisor",
            "set-regions",
            "--mdds",
            "stage",
            "--fpss",
            "dev",
        ])
        .unwrap();
        match args.command {
            Some(Command::SetRegions(r)) => {
                assert_eq!(r.mdds, RegionHost::Stage);
                assert_eq!(r.fpss, RegionHost::Dev);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_region() {
        assert!(CliArgs::try_parse_from([
            "terminal-supervisor",
            "set-regions",
            "--mdds",
            "eu",
            "--fpss",
            "dev",
        ])
        .is_err());
    }
}
