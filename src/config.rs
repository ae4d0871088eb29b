//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Main window title
    pub title: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Entity descriptor file (JSON or YAML)
    pub registry_path: PathBuf,

    /// Directory scanned for tab modules; every built-in tab loads when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabs_dir: Option<PathBuf>,

    /// UI loop tick in milliseconds
    pub tick_rate_ms: u64,

    /// Forward reminders to the desktop notification daemon
    pub desktop_notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = Self::data_dir();
        Self {
            title: "Desk Shell".to_string(),
            database_path: data_dir.join("data").join("app.db"),
            registry_path: data_dir.join("data").join("entity_registry.json"),
            tabs_dir: None,
            tick_rate_ms: 50,
            desktop_notifications: true,
        }
    }
}

impl AppConfig {
    /// `<data_dir>/deskshell`, falling back to the working directory
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deskshell")
    }

    /// `<config_dir>/deskshell/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("deskshell").join("config.toml"))
    }

    /// Load configuration from file; a missing file yields the defaults
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`
    pub async fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load_from_file(path).await,
            None => match Self::default_path() {
                Some(path) => Self::load_from_file(&path).await,
                None => Ok(Self::default()),
            },
        }
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.tick_rate_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_rate_ms must be greater than 0".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load_from_file(&temp_dir.path().join("config.toml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.tick_rate_ms, 50);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "title = \"Planner\"\ntabs_dir = \"/opt/tabs\"\n").unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.title, "Planner");
        assert_eq!(config.tabs_dir, Some(PathBuf::from("/opt/tabs")));
        assert!(config.desktop_notifications);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.tick_rate_ms = 100;
        config.desktop_notifications = false;
        config.save_to_file(&path).await.unwrap();

        assert_eq!(AppConfig::load_from_file(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "tick_rate_ms = 0\n").unwrap();

        assert!(matches!(
            AppConfig::load_from_file(&path).await,
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "tick_rate_ms = \"fast\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path).await,
            Err(ConfigError::Parse(_))
        ));
    }
}
