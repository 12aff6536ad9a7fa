//! Configuration file parser for ~/.config/markfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::store::scheduler::{self, UpdateSettings};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Links processed concurrently.
    pub workers: usize,

    /// Seconds that must pass before a feed is fetched again.
    pub min_check_interval_secs: u64,

    /// Give up discovery after this many failures. Unset = never give up.
    pub max_discovery_attempts: Option<u32>,

    /// Largest response body we will read, in bytes.
    pub max_body_bytes: usize,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Where the link store lives. Unset = `links.json` next to the config.
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: scheduler::DEFAULT_WORKERS,
            min_check_interval_secs: scheduler::MIN_CHECK_INTERVAL.as_secs(),
            max_discovery_attempts: None,
            max_body_bytes: scheduler::MAX_BODY_BYTES,
            user_agent: concat!("markfeed/", env!("CARGO_PKG_VERSION")).to_string(),
            store_path: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a corrupted file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "workers",
                "min_check_interval_secs",
                "max_discovery_attempts",
                "max_body_bytes",
                "user_agent",
                "store_path",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), workers = config.workers, "Loaded configuration");
        Ok(config)
    }

    /// Settings for the update scheduler derived from this config.
    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            workers: self.workers.max(1),
            min_check_interval: Duration::from_secs(self.min_check_interval_secs),
            max_discovery_attempts: self.max_discovery_attempts,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("markfeed_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workers, 8);
        assert_eq!(config.min_check_interval_secs, 300);
        assert_eq!(config.max_discovery_attempts, None);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.user_agent.starts_with("markfeed/"));
        assert!(config.store_path.is_none());
        assert_eq!(config.update_settings(), UpdateSettings::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/markfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "workers = 2\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.min_check_interval_secs, 300); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = write_config(
            "full",
            r#"
workers = 4
min_check_interval_secs = 60
max_discovery_attempts = 5
max_body_bytes = 1024
user_agent = "test-agent"
store_path = "/var/lib/markfeed/links.json"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(
            config.store_path.as_deref(),
            Some(Path::new("/var/lib/markfeed/links.json"))
        );

        let settings = config.update_settings();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.min_check_interval, Duration::from_secs(60));
        assert_eq!(settings.max_discovery_attempts, Some(5));
        assert_eq!(settings.max_body_bytes, 1024);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_workers_clamped() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert_eq!(config.update_settings().workers, 1);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "workers = 3\ntotally_fake_key = 1\n");
        assert_eq!(Config::load(&path).unwrap().workers, 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "workers = \"many\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
