#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use terminal_supervisor::config::{RawConfigFile, SupervisorConfig};
use terminal_supervisor::{Supervisor, SupervisorBuilder};

use crate::fakes::QuietProcessTable;

/// Fake terminals, run as `sh <script> <username> <password>`.
pub mod scripts {
    /// Echoes its input and exits on `quit`.
    pub const COOPERATIVE: &str = r#"echo "terminal up as $1"
while IFS= read -r line; do
  echo "received $line"
  if [ "$line" = "quit" ]; then
    echo "bye"
    exit 0
  fi
done
"#;

    /// Understands only `q`, the last of the default quit tokens.
    pub const QUITS_ON_Q: &str = r#"echo "terminal up"
while IFS= read -r line; do
  if [ "$line" = "q" ]; then
    exit 0
  fi
done
"#;

    /// Never reads stdin; exits on the termination signal.
    pub const EXITS_ON_TERM: &str = r#"trap 'echo "got TERM"; exit 0' TERM
echo "terminal up"
while true; do sleep 0.1; done
"#;

    /// Ignores both quit tokens and the termination signal.
    pub const STUBBORN: &str = r#"trap '' TERM
echo "terminal up"
while true; do sleep 0.1; done
"#;

    /// Prints its credentials and exits straight away.
    pub const EXITS_AT_ONCE: &str = r#"echo "hello $1 $2"
exit 3
"#;

    /// Closes stdout and stderr but keeps running.
    pub const CLOSES_OUTPUT: &str = r#"trap 'exit 0' TERM
echo "terminal up"
exec >/dev/null 2>&1
while true; do sleep 0.1; done
"#;

    /// Closes its output, lingers for a second, then exits cleanly.
    pub const CLOSES_OUTPUT_THEN_EXITS: &str = r#"echo "terminal up"
exec >/dev/null 2>&1
sleep 1
exit 0
"#;

    /// Writes a line that is not valid UTF-8 between two plain ones.
    pub const NON_UTF8_OUTPUT: &str = r#"trap 'exit 0' TERM
printf 'line one\ncaf\351\nline three\n'
while true; do sleep 0.1; done
"#;

    /// Leaves a helper in its own session, reports the helper's pid, and
    /// exits on `quit`.
    pub const DETACHES_HELPER: &str = r#"setsid sh -c 'exec sleep 30' >/dev/null 2>&1 </dev/null &
echo "helper $!"
echo "terminal up"
while IFS= read -r line; do
  if [ "$line" = "quit" ]; then
    exit 0
  fi
done
"#;
}

static FIXTURE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Temporary directory holding a fake terminal artifact and the settings
/// files the supervisor writes.
///
/// Each fixture gets a unique artifact file name so the post-stop sweep of
/// one test never matches another test's processes.
pub struct TerminalFixture {
    dir: TempDir,
    artifact_name: String,
}

impl TerminalFixture {
    pub fn new(label: &str) -> Self {
        let seq = FIXTURE_SEQ.fetch_add(1, Ordering::SeqCst);
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            artifact_name: format!("{label}-{}-{seq}-terminal.sh", std::process::id()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.path().join("bin").join(&self.artifact_name)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn region_path(&self) -> PathBuf {
        self.dir.path().join("config_0.properties")
    }

    /// Put `script` in place as the artifact.
    pub fn install(&self, script: &str) -> &Self {
        let path = self.artifact_path();
        std::fs::create_dir_all(path.parent().expect("artifact has a parent"))
            .expect("create artifact dir");
        std::fs::write(&path, script).expect("write artifact");
        self
    }

    pub fn write_regions(&self, contents: &str) -> &Self {
        std::fs::write(self.region_path(), contents).expect("write region file");
        self
    }

    pub fn read_regions(&self) -> String {
        std::fs::read_to_string(self.region_path()).expect("read region file")
    }

    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::for_fixture(self)
    }
}

/// Builder for `SupervisorConfig`, with short shutdown waits suited to tests.
pub struct ConfigBuilder {
    raw: RawConfigFile,
}

impl ConfigBuilder {
    pub fn for_fixture(fixture: &TerminalFixture) -> Self {
        let mut raw = RawConfigFile::default();
        raw.artifact.path = fixture.artifact_path();
        raw.artifact.url = "test://artifact".to_string();
        raw.launch.program = "sh".to_string();
        raw.launch.args = Vec::new();
        raw.settings.credentials_file = fixture.credentials_path();
        raw.settings.region_file = Some(fixture.region_path());
        raw.download.settle_delay_ms = 50;
        raw.shutdown.deadline_ms = 4_000;
        raw.shutdown.token_wait_ms = 150;
        raw.shutdown.signal_wait_ms = 500;
        raw.shutdown.kill_wait_ms = 500;
        raw.shutdown.abort_budget_ms = 500;
        Self { raw }
    }

    pub fn program(mut self, program: &str) -> Self {
        self.raw.launch.program = program.to_string();
        self
    }

    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.raw.download.auto_start = enabled;
        self
    }

    pub fn deadline_ms(mut self, ms: u64) -> Self {
        self.raw.shutdown.deadline_ms = ms;
        self
    }

    pub fn token_wait_ms(mut self, ms: u64) -> Self {
        self.raw.shutdown.token_wait_ms = ms;
        self
    }

    pub fn signal_wait_ms(mut self, ms: u64) -> Self {
        self.raw.shutdown.signal_wait_ms = ms;
        self
    }

    pub fn kill_wait_ms(mut self, ms: u64) -> Self {
        self.raw.shutdown.kill_wait_ms = ms;
        self
    }

    pub fn quit_tokens(mut self, tokens: &[&str]) -> Self {
        self.raw.shutdown.quit_tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }

    pub fn build(self) -> SupervisorConfig {
        SupervisorConfig::try_from(self.raw).expect("Failed to build valid config from builder")
    }

    /// Supervisor builder with a process table that sees nothing.
    pub fn supervisor(self) -> SupervisorBuilder {
        Supervisor::builder(self.build()).process_table(Arc::new(QuietProcessTable::default()))
    }
}
