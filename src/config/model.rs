// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_ARTIFACT: &str = "ThetaTerminal.jar";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://download-stable.thetadata.us/ThetaTerminal.jar";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [artifact]
/// path = "ThetaTerminal.jar"
/// url = "https://download-stable.thetadata.us/ThetaTerminal.jar"
///
/// [launch]
/// program = "java"
/// args = ["-jar"]
///
/// [settings]
/// credentials_file = "config.json"
/// region_file = "/home/me/ThetaData/ThetaTerminal/config_0.properties"
///
/// [download]
/// auto_start = true
/// settle_delay_ms = 1000
///
/// [shutdown]
/// deadline_ms = 10000
/// quit_tokens = ["quit", "exit", "stop", "q"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub artifact: ArtifactSection,

    #[serde(default)]
    pub launch: LaunchSection,

    #[serde(default)]
    pub settings: SettingsSection,

    #[serde(default)]
    pub download: DownloadSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,
}

/// `[artifact]` section: where the terminal binary lives and where to fetch
/// it from when it is missing.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSection {
    #[serde(default = "default_artifact_path")]
    pub path: PathBuf,

    #[serde(default = "default_download_url")]
    pub url: String,
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT)
}

fn default_download_url() -> String {
    DEFAULT_DOWNLOAD_URL.to_string()
}

impl Default for ArtifactSection {
    fn default() -> Self {
        Self {
            path: default_artifact_path(),
            url: default_download_url(),
        }
    }
}

/// `[launch]` section.
///
/// The child is started as `program [args...] <artifact> <username> <password>`.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_program_args")]
    pub args: Vec<String>,
}

fn default_program() -> String {
    "java".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["-jar".to_string()]
}

impl Default for LaunchSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_program_args(),
        }
    }
}

/// `[settings]` section: locations of the persisted credentials and of the
/// terminal's own property file.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// If `None`, [`default_region_file`] is used.
    #[serde(default)]
    pub region_file: Option<PathBuf>,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("config.json")
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            region_file: None,
        }
    }
}

/// Property file the terminal reads its region selectors from:
/// `$HOME/ThetaData/ThetaTerminal/config_0.properties`
/// (`%USERPROFILE%` on Windows), or the working directory if neither is set.
pub fn default_region_file() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join("ThetaData")
        .join("ThetaTerminal")
        .join("config_0.properties")
}

/// `[download]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    /// Launch the terminal automatically once a download triggered by
    /// `start` completes.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_auto_start() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            auto_start: default_auto_start(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// `[shutdown]` section, all durations in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSection {
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_token_wait_ms")]
    pub token_wait_ms: u64,

    #[serde(default = "default_signal_wait_ms")]
    pub signal_wait_ms: u64,

    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,

    #[serde(default = "default_abort_budget_ms")]
    pub abort_budget_ms: u64,

    #[serde(default = "default_quit_tokens")]
    pub quit_tokens: Vec<String>,
}

fn default_deadline_ms() -> u64 {
    10_000
}

fn default_token_wait_ms() -> u64 {
    1_000
}

fn default_signal_wait_ms() -> u64 {
    3_000
}

fn default_kill_wait_ms() -> u64 {
    2_000
}

fn default_abort_budget_ms() -> u64 {
    500
}

fn default_quit_tokens() -> Vec<String> {
    ["quit", "exit", "stop", "q"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            token_wait_ms: default_token_wait_ms(),
            signal_wait_ms: default_signal_wait_ms(),
            kill_wait_ms: default_kill_wait_ms(),
            abort_budget_ms: default_abort_budget_ms(),
            quit_tokens: default_quit_tokens(),
        }
    }
}

/// Timeouts and quit tokens driving the staged stop sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Hard bound on the whole `stop()` call, measured from entry.
    pub deadline: Duration,
    /// Wait for exit after each cooperative quit token.
    pub token_wait: Duration,
    /// Wait for exit after the graceful termination signal.
    pub signal_wait: Duration,
    /// Wait for exit after the process-group kill.
    pub kill_wait: Duration,
    /// Total budget of the abbreviated `abort()` sequence.
    pub abort_budget: Duration,
    pub quit_tokens: Vec<String>,
}

impl From<&ShutdownSection> for ShutdownPolicy {
    fn from(s: &ShutdownSection) -> Self {
        Self {
            deadline: Duration::from_millis(s.deadline_ms),
            token_wait: Duration::from_millis(s.token_wait_ms),
            signal_wait: Duration::from_millis(s.signal_wait_ms),
            kill_wait: Duration::from_millis(s.kill_wait_ms),
            abort_budget: Duration::from_millis(s.abort_budget_ms),
            quit_tokens: s.quit_tokens.clone(),
        }
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self::from(&ShutdownSection::default())
    }
}

/// Validated configuration used by the rest of the crate.
///
/// Build it through `SupervisorConfig::try_from(raw)` (see `validate.rs`)
/// or [`Default`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub artifact_path: PathBuf,
    pub download_url: String,
    pub program: String,
    pub program_args: Vec<String>,
    pub credentials_file: PathBuf,
    pub region_file: PathBuf,
    pub auto_start: bool,
    pub settle_delay: Duration,
    pub shutdown: ShutdownPolicy,
}

impl SupervisorConfig {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            artifact_path: raw.artifact.path,
            download_url: raw.artifact.url,
            program: raw.launch.program,
            program_args: raw.launch.args,
            credentials_file: raw.settings.credentials_file,
            region_file: raw
                .settings
                .region_file
                .unwrap_or_else(default_region_file),
            auto_start: raw.download.auto_start,
            settle_delay: Duration::from_millis(raw.download.settle_delay_ms),
            shutdown: ShutdownPolicy::from(&raw.shutdown),
        }
    }

    /// File name of the artifact (used to recognise stray terminal processes).
    pub fn artifact_file_name(&self) -> String {
        self.artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.artifact_path.to_string_lossy().into_owned())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}
