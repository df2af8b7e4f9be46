// src/settings/credentials.rs

//! Persisted login: a small JSON object next to the executable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Context;

use crate::errors::Result;
use crate::types::Credentials;

/// Read the credentials file.
///
/// Returns `Ok(None)` if the file does not exist; parse errors are returned
/// so the caller can log them before falling back to defaults.
pub fn read_credentials(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading credentials file {:?}", path))?;
    let creds: Credentials = serde_json::from_str(&contents)?;
    Ok(Some(creds))
}

/// Overwrite the credentials file, creating parent directories as needed.
///
/// A new file is created owner-only (0600 on unix); an existing one is
/// narrowed to that mode before it is rewritten.
pub fn write_credentials(path: &Path, creds: &Credentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
    }
    let json = serde_json::to_vec(creds)?;
    if path.exists() {
        restrict_permissions(path);
    }
    let mut file = owner_only()
        .open(path)
        .with_context(|| format!("opening credentials file {:?}", path))?;
    file.write_all(&json)
        .with_context(|| format!("writing credentials file {:?}", path))?;
    Ok(())
}

fn owner_only() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::debug!(path = %path.display(), error = %e, "could not restrict credentials file mode");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_credentials(&dir.path().join("nope.json")).unwrap(), None);
    }

    #[test]
    fn writes_plain_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        write_credentials(&path, &Credentials::new("alice", "secret")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["username"], "alice");
        assert_eq!(raw["password"], "secret");
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("config.json");
        write_credentials(&fresh, &Credentials::new("alice", "secret")).unwrap();
        let mode = fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let existing = dir.path().join("existing.json");
        fs::write(&existing, "{}").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o644)).unwrap();
        write_credentials(&existing, &Credentials::new("bob", "pw")).unwrap();
        let mode = fs::metadata(&existing).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(read_credentials(&path).is_err());
    }
}
