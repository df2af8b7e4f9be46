// src/settings/mod.rs

//! Settings store: persisted credentials plus the region selectors mirrored
//! from the terminal's property file.
//!
//! Every IO problem here is recovered locally: missing or corrupt files mean
//! defaults, and failures are logged rather than raised, except for
//! [`SettingsStore::save_credentials`] which reports the error so the
//! supervisor can surface it on its log sink.

pub mod credentials;
pub mod regions;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::errors::Result;
use crate::types::{Credentials, RegionHost, RegionSettings};

pub use credentials::{read_credentials, write_credentials};
pub use regions::{parse_region_settings, rewrite_region_lines};

#[derive(Debug)]
pub struct SettingsStore {
    credentials_path: PathBuf,
    region_path: PathBuf,
    credentials: RwLock<Credentials>,
    regions: RwLock<RegionSettings>,
}

impl SettingsStore {
    /// Open the store, reading both files once (best-effort).
    pub fn open(credentials_path: impl Into<PathBuf>, region_path: impl Into<PathBuf>) -> Self {
        let store = Self {
            credentials_path: credentials_path.into(),
            region_path: region_path.into(),
            credentials: RwLock::new(Credentials::default()),
            regions: RwLock::new(RegionSettings::default()),
        };
        store.load_credentials();
        store.read_region_settings();
        store
    }

    pub fn from_config(cfg: &SupervisorConfig) -> Self {
        Self::open(&cfg.credentials_file, &cfg.region_file)
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn region_path(&self) -> &Path {
        &self.region_path
    }

    /// Last loaded or saved credentials.
    pub fn credentials(&self) -> Credentials {
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-read the credentials file. Missing file gives empty credentials;
    /// a corrupt file is logged and also gives empty credentials.
    pub fn load_credentials(&self) -> Credentials {
        let creds = match read_credentials(&self.credentials_path) {
            Ok(Some(creds)) => {
                debug!(path = %self.credentials_path.display(), "loaded stored credentials");
                creds
            }
            Ok(None) => Credentials::default(),
            Err(e) => {
                warn!(
                    path = %self.credentials_path.display(),
                    error = %e,
                    "error loading credentials; using empty defaults"
                );
                Credentials::default()
            }
        };
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = creds.clone();
        creds
    }

    /// Remember and persist credentials.
    ///
    /// The in-memory copy is updated even if writing the file fails.
    pub fn save_credentials(&self, creds: &Credentials) -> Result<()> {
        *self.credentials.write().unwrap_or_else(|e| e.into_inner()) = creds.clone();
        write_credentials(&self.credentials_path, creds)
    }

    /// Cached region settings.
    pub fn region_settings(&self) -> RegionSettings {
        *self.regions.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Scan the property file for the region keys; anything missing or
    /// unreadable falls back to production defaults.
    pub fn read_region_settings(&self) -> RegionSettings {
        let settings = match fs::read_to_string(&self.region_path) {
            Ok(contents) => parse_region_settings(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.region_path.display(), "no region property file; using defaults");
                RegionSettings::default()
            }
            Err(e) => {
                warn!(
                    path = %self.region_path.display(),
                    error = %e,
                    "error reading region property file; using defaults"
                );
                RegionSettings::default()
            }
        };
        *self.regions.write().unwrap_or_else(|e| e.into_inner()) = settings;
        settings
    }

    /// Update the two region lines of the property file.
    ///
    /// The values are cached either way. Returns `false` if the file does not
    /// exist yet (it is not created) or could not be rewritten.
    pub fn update_region_settings(&self, mdds: RegionHost, fpss: RegionHost) -> bool {
        let settings = RegionSettings { mdds, fpss };
        *self.regions.write().unwrap_or_else(|e| e.into_inner()) = settings;

        if !self.region_path.is_file() {
            info!(
                path = %self.region_path.display(),
                "region property file does not exist yet; settings cached for later"
            );
            return false;
        }

        match self.rewrite_region_file(&settings) {
            Ok(()) => {
                info!(
                    path = %self.region_path.display(),
                    mdds = %mdds,
                    fpss = %fpss,
                    "region settings updated"
                );
                true
            }
            Err(e) => {
                warn!(
                    path = %self.region_path.display(),
                    error = %e,
                    "failed to update region property file"
                );
                false
            }
        }
    }

    fn rewrite_region_file(&self, settings: &RegionSettings) -> Result<()> {
        let path = &self.region_path;
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        let updated = rewrite_region_lines(&contents, settings);

        let tmp = tmp_sibling(path);
        fs::write(&tmp, updated).with_context(|| format!("writing {:?}", tmp))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(anyhow::Error::from(e)
                .context(format!("replacing {:?}", path))
                .into());
        }
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
