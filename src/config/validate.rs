// src/config/validate.rs

use crate::config::model::{RawConfigFile, SupervisorConfig};
use crate::errors::{Result, SupervisorError};

impl TryFrom<RawConfigFile> for SupervisorConfig {
    type Error = crate::errors::SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(SupervisorConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_artifact(cfg)?;
    validate_launch(cfg)?;
    validate_shutdown(cfg)?;
    Ok(())
}

fn validate_artifact(cfg: &RawConfigFile) -> Result<()> {
    if cfg.artifact.path.as_os_str().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[artifact].path must not be empty".to_string(),
        ));
    }
    if cfg.artifact.url.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[artifact].url must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_launch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.launch.program.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[launch].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_shutdown(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.shutdown;

    if s.deadline_ms == 0 {
        return Err(SupervisorError::ConfigError(
            "[shutdown].deadline_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if s.deadline_ms < s.token_wait_ms {
        return Err(SupervisorError::ConfigError(format!(
            "[shutdown].deadline_ms ({}) is shorter than a single token_wait_ms ({})",
            s.deadline_ms, s.token_wait_ms
        )));
    }

    if s.quit_tokens.iter().any(|t| t.contains('\n')) {
        return Err(SupervisorError::ConfigError(
            "[shutdown].quit_tokens must not contain newlines".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<SupervisorConfig> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        SupervisorConfig::try_from(raw)
    }

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.program, "java");
        assert_eq!(cfg.program_args, vec!["-jar".to_string()]);
        assert_eq!(cfg.artifact_file_name(), "ThetaTerminal.jar");
        assert!(cfg.auto_start);
        assert_eq!(cfg.shutdown.deadline.as_secs(), 10);
        assert_eq!(cfg.shutdown.quit_tokens, vec!["quit", "exit", "stop", "q"]);
        assert!(cfg.region_file.ends_with("config_0.properties"));
    }

    #[test]
    fn rejects_zero_deadline() {
        let err = parse("[shutdown]\ndeadline_ms = 0\n").unwrap_err();
        match err {
            SupervisorError::ConfigError(msg) => assert!(msg.contains("deadline_ms")),
            other => panic!("Expected ConfigError, got: {other:?}"),
        }
    }

    #[test]
    fn rejects_deadline_shorter_than_token_wait() {
        let err = parse("[shutdown]\ndeadline_ms = 500\ntoken_wait_ms = 1000\n").unwrap_err();
        assert!(matches!(err, SupervisorError::ConfigError(_)));
    }

    #[test]
    fn rejects_empty_program() {
        let err = parse("[launch]\nprogram = \"  \"\n").unwrap_err();
        match err {
            SupervisorError::ConfigError(msg) => assert!(msg.contains("[launch].program")),
            other => panic!("Expected ConfigError, got: {other:?}"),
        }
    }

    #[test]
    fn explicit_region_file_wins() {
        let cfg = parse("[settings]\nregion_file = \"/tmp/terminal.properties\"\n").unwrap();
        assert_eq!(
            cfg.region_file,
            std::path::PathBuf::from("/tmp/terminal.properties")
        );
    }
}
