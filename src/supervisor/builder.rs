// src/supervisor/builder.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64};

use tokio::sync::Mutex;

use crate::config::SupervisorConfig;
use crate::errors::Result;
use crate::process::{OsTerminator, ProcessTable, SysinfoProcessTable, Terminator};
use crate::provision::{ArtifactSource, HttpArtifactSource, Provisioner};
use crate::settings::SettingsStore;
use crate::sinks::Sinks;
use crate::types::Phase;

use super::{Inner, Supervisor};

/// Assembles a [`Supervisor`], allowing the platform seams (download source,
/// terminator, process table) to be replaced.
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    source: Option<Arc<dyn ArtifactSource>>,
    terminator: Option<Arc<dyn Terminator>>,
    process_table: Option<Arc<dyn ProcessTable>>,
}

impl SupervisorBuilder {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            source: None,
            terminator: None,
            process_table: None,
        }
    }

    pub fn artifact_source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn process_table(mut self, table: Arc<dyn ProcessTable>) -> Self {
        self.process_table = Some(table);
        self
    }

    /// Build the supervisor. Reads stored credentials and region settings
    /// once; fails only if the HTTP client cannot be created.
    pub fn build(self) -> Result<Supervisor> {
        let source: Arc<dyn ArtifactSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HttpArtifactSource::new(self.config.download_url.clone())?),
        };
        let terminator = self
            .terminator
            .unwrap_or_else(|| Arc::new(OsTerminator));
        let process_table = self
            .process_table
            .unwrap_or_else(|| Arc::new(SysinfoProcessTable));

        let sinks = Arc::new(Sinks::new());
        let settings = SettingsStore::from_config(&self.config);
        let provisioner = Arc::new(Provisioner::new(
            self.config.artifact_path.clone(),
            source,
            Arc::clone(&sinks),
        ));

        let inner = Inner {
            auto_start: AtomicBool::new(self.config.auto_start),
            config: self.config,
            settings,
            provisioner,
            sinks,
            terminator,
            process_table,
            phase: AtomicU8::new(Phase::Idle as u8),
            generation: AtomicU64::new(0),
            child: Mutex::new(None),
            lifecycle: Mutex::new(()),
        };

        Ok(Supervisor {
            inner: Arc::new(inner),
        })
    }
}
