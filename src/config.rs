//! Configuration loader and validator for the scheduler.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::state::DEFAULT_STATE_FILE;
use crate::vk::DEFAULT_API_VERSION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub vk: Vk,
    pub scheduler: Scheduler,
    pub maintenance: Maintenance,
    /// Pool of decorative suffixes; one is picked per post when enabled.
    pub decorations: Vec<String>,
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub state_file: String,
    pub photos_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            state_file: DEFAULT_STATE_FILE.into(),
            photos_dir: "photos".into(),
        }
    }
}

/// VK API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Vk {
    pub api_base: String,
    pub api_version: String,
}

impl Default for Vk {
    fn default() -> Self {
        Self {
            api_base: "https://api.vk.com/method/".into(),
            api_version: DEFAULT_API_VERSION.into(),
        }
    }
}

/// Posting run tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scheduler {
    pub grace_seconds: i64,
    pub post_delay_ms: u64,
    pub pause_poll_ms: u64,
    pub upload_workers: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            grace_seconds: 60,
            post_delay_ms: 3000,
            pause_poll_ms: 1000,
            upload_workers: 9,
        }
    }
}

/// Postponed-post listing and cleanup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Maintenance {
    pub page_size: u32,
    pub request_delay_ms: u64,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self {
            page_size: 100,
            request_delay_ms: 350,
        }
    }
}

/// Runtime knobs consumed by the engine and the maintenance actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub grace_seconds: i64,
    pub post_delay: Duration,
    pub pause_poll: Duration,
    pub upload_workers: usize,
    pub page_size: u32,
    pub request_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Config::default().engine_settings()
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            grace_seconds: self.scheduler.grace_seconds,
            post_delay: Duration::from_millis(self.scheduler.post_delay_ms),
            pause_poll: Duration::from_millis(self.scheduler.pause_poll_ms),
            upload_workers: self.scheduler.upload_workers,
            page_size: self.maintenance.page_size,
            request_delay: Duration::from_millis(self.maintenance.request_delay_ms),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like [`load`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    load(Some(path))
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.state_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.state_file must be non-empty"));
    }
    if cfg.vk.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("vk.api_base must be non-empty"));
    }
    if !cfg.vk.api_base.ends_with('/') {
        return Err(ConfigError::Invalid("vk.api_base must end with '/'"));
    }
    if cfg.vk.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("vk.api_version must be non-empty"));
    }
    if cfg.scheduler.grace_seconds <= 0 {
        return Err(ConfigError::Invalid("scheduler.grace_seconds must be > 0"));
    }
    if cfg.scheduler.pause_poll_ms == 0 {
        return Err(ConfigError::Invalid("scheduler.pause_poll_ms must be > 0"));
    }
    if cfg.scheduler.upload_workers == 0 {
        return Err(ConfigError::Invalid("scheduler.upload_workers must be > 0"));
    }
    if !(1..=100).contains(&cfg.maintenance.page_size) {
        return Err(ConfigError::Invalid("maintenance.page_size must be within 1..=100"));
    }
    Ok(())
}

/// Returns the example YAML shipped with the tool.
pub fn example() -> &'static str {
    r#"app:
  state_file: "last_settings.cfg"
  photos_dir: "photos"

vk:
  api_base: "https://api.vk.com/method/"
  api_version: "5.199"

scheduler:
  grace_seconds: 60
  post_delay_ms: 3000
  pause_poll_ms: 1000
  upload_workers: 9

maintenance:
  page_size: 100
  request_delay_ms: 350

decorations:
  - "🍺"
  - "🧃"
  - "✨"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.scheduler, Scheduler::default());
        assert_eq!(cfg.decorations.len(), 3);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("scheduler:\n  upload_workers: 4\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.scheduler.upload_workers, 4);
        assert_eq!(cfg.scheduler.grace_seconds, 60);
        assert_eq!(cfg.vk, Vk::default());
        assert!(cfg.decorations.is_empty());
    }

    #[test]
    fn invalid_scheduler_values() {
        let mut cfg = Config::default();
        cfg.scheduler.upload_workers = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("upload_workers")),
            _ => panic!("wrong error"),
        }

        let mut cfg = Config::default();
        cfg.scheduler.pause_poll_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.scheduler.grace_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_vk_and_maintenance_values() {
        let mut cfg = Config::default();
        cfg.vk.api_base = "https://api.vk.com/method".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api_base")),
            _ => panic!("wrong error"),
        }

        let mut cfg = Config::default();
        cfg.maintenance.page_size = 101;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.vk.api_version = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn engine_settings_projection() {
        let settings = Config::default().engine_settings();
        assert_eq!(settings.grace_seconds, 60);
        assert_eq!(settings.post_delay, Duration::from_secs(3));
        assert_eq!(settings.pause_poll, Duration::from_secs(1));
        assert_eq!(settings.upload_workers, 9);
        assert_eq!(settings.page_size, 100);
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.maintenance.request_delay_ms, 350);

        let missing = td.path().join("absent.yaml");
        assert!(matches!(load(Some(&missing)), Err(ConfigError::Io(_))));
        assert_eq!(load_or_default(&missing).unwrap(), Config::default());
    }
}
