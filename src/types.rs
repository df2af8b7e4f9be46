// src/types.rs

//! Value types shared by the settings store, the provisioner and the
//! supervisor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stored login for the terminal.
///
/// This is exactly the shape of the persisted credentials file:
///
/// ```json
/// {"username": "alice", "password": "secret"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Host group a region selector points at.
///
/// The terminal knows exactly three groups per axis; anything else found in
/// the property file is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegionHost {
    /// Production hosts (`*_NJ_HOSTS`).
    #[default]
    Nj,
    Stage,
    Dev,
}

impl RegionHost {
    pub const ALL: [RegionHost; 3] = [RegionHost::Nj, RegionHost::Stage, RegionHost::Dev];

    fn suffix(self) -> &'static str {
        match self {
            RegionHost::Nj => "NJ_HOSTS",
            RegionHost::Stage => "STAGE_HOSTS",
            RegionHost::Dev => "DEV_HOSTS",
        }
    }
}

impl fmt::Display for RegionHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegionHost::Nj => "nj",
            RegionHost::Stage => "stage",
            RegionHost::Dev => "dev",
        };
        f.write_str(s)
    }
}

impl FromStr for RegionHost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nj" | "prod" | "production" => Ok(RegionHost::Nj),
            "stage" => Ok(RegionHost::Stage),
            "dev" => Ok(RegionHost::Dev),
            other => Err(format!(
                "invalid region host: {other} (expected \"nj\", \"stage\" or \"dev\")"
            )),
        }
    }
}

/// The two region selector keys of the terminal's property file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKey {
    Mdds,
    Fpss,
}

impl RegionKey {
    pub const ALL: [RegionKey; 2] = [RegionKey::Mdds, RegionKey::Fpss];

    /// Property name as it appears in the file (`MDDS_REGION`).
    pub fn property_name(self) -> &'static str {
        match self {
            RegionKey::Mdds => "MDDS_REGION",
            RegionKey::Fpss => "FPSS_REGION",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RegionKey::Mdds => "MDDS",
            RegionKey::Fpss => "FPSS",
        }
    }

    /// Serialized value for a host on this axis, e.g. `FPSS_STAGE_HOSTS`.
    pub fn token(self, host: RegionHost) -> String {
        format!("{}_{}", self.prefix(), host.suffix())
    }

    /// Parse a value token for this axis. Tokens of the other axis and
    /// unknown tokens yield `None`.
    pub fn parse_token(self, token: &str) -> Option<RegionHost> {
        let token = token.trim();
        RegionHost::ALL
            .into_iter()
            .find(|host| self.token(*host) == token)
    }
}

/// Region selection mirrored from the terminal's property file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionSettings {
    pub mdds: RegionHost,
    pub fpss: RegionHost,
}

impl RegionSettings {
    pub fn get(&self, key: RegionKey) -> RegionHost {
        match key {
            RegionKey::Mdds => self.mdds,
            RegionKey::Fpss => self.fpss,
        }
    }

    pub fn set(&mut self, key: RegionKey, host: RegionHost) {
        match key {
            RegionKey::Mdds => self.mdds = host,
            RegionKey::Fpss => self.fpss = host,
        }
    }
}

/// One progress report of an artifact download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    /// 0..=100.
    pub percentage: u8,
    pub downloaded: u64,
    /// Zero while the total size is unknown.
    pub total: u64,
}

/// Lifecycle phase of the supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl Phase {
    pub(crate) fn from_u8(v: u8) -> Phase {
        match v {
            1 => Phase::Starting,
            2 => Phase::Running,
            3 => Phase::Stopping,
            _ => Phase::Idle,
        }
    }
}

/// Non-blocking snapshot of the supervisor flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorState {
    pub running: bool,
    pub downloading: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_tokens_are_axis_specific() {
        assert_eq!(RegionKey::Mdds.token(RegionHost::Nj), "MDDS_NJ_HOSTS");
        assert_eq!(RegionKey::Fpss.token(RegionHost::Dev), "FPSS_DEV_HOSTS");

        assert_eq!(
            RegionKey::Fpss.parse_token(" FPSS_STAGE_HOSTS "),
            Some(RegionHost::Stage)
        );
        // A valid token for the other axis is not accepted.
        assert_eq!(RegionKey::Mdds.parse_token("FPSS_STAGE_HOSTS"), None);
        assert_eq!(RegionKey::Mdds.parse_token("MDDS_MOON_HOSTS"), None);
    }

    #[test]
    fn region_host_from_str() {
        assert_eq!("Stage".parse::<RegionHost>(), Ok(RegionHost::Stage));
        assert_eq!("production".parse::<RegionHost>(), Ok(RegionHost::Nj));
        assert!("eu".parse::<RegionHost>().is_err());
    }

    #[test]
    fn credentials_json_tolerates_missing_fields() {
        let creds: Credentials = serde_json::from_str(r#"{"username":"bob"}"#).unwrap();
        assert_eq!(creds, Credentials::new("bob", ""));
    }
}
