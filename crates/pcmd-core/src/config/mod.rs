//! Configuration management for pcmd

mod session;
mod settings;

pub mod serde_utils;

pub use session::{BuildInfo, ChildCommand, EntryMode, SessionConfig};
pub use settings::Settings;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pcmd")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_path_is_under_pcmd_dir() {
        let path = default_config_path();
        assert!(path.ends_with("pcmd/config.toml"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let result = load_config::<Settings>(&path);
        assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
    }

    #[test]
    fn test_load_config_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "grace_period = 5\npoll_attempts = 3\n").unwrap();

        let settings: Settings = load_config(&path).unwrap();
        assert_eq!(settings.grace_period, Duration::from_secs(5));
        assert_eq!(settings.poll_attempts, 3);
        assert_eq!(settings.poll_interval, Settings::default().poll_interval);
        assert_eq!(settings.work_dir, Settings::default().work_dir);
    }

    #[test]
    fn test_load_config_rejects_malformed_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "grace_period = \"soon\"\n").unwrap();

        let result = load_config::<Settings>(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
