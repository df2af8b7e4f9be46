// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ArtifactSection, DownloadSection, LaunchSection, RawConfigFile, SettingsSection,
    ShutdownPolicy, ShutdownSection, SupervisorConfig, default_region_file,
};
