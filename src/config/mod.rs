//! # Configuration
//!
//! TOML configuration for the `mumemap` binary and for hosts embedding the
//! mapper.
//!
//! ## Configuration Structure
//!
//! - [`MapperConfig`] - where map data comes from and how much to show
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mumemap::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Write a starter file, then load and validate it
//!     Config::create_default("mumemap.toml").await?;
//!     let config = Config::load("mumemap.toml").await?;
//!     println!("Map data from {}", config.mapper.base_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [mapper]
//! base_url = "https://mume.org/mapdata/v1/"
//! data_dir = ""          # local mirror of the data tree; overrides base_url
//! timeout_seconds = 10
//! view_radius = 20
//!
//! [logging]
//! level = "info"
//! file = "mumemap.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::mapper::errors::MapperError;
use crate::mapper::DEFAULT_VIEW_RADIUS;
pub use crate::mapper::MAX_VIEW_RADIUS;

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mapper: MapperConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Root URL of the published map data.
    pub base_url: String,
    /// Local copy of the data tree. Empty means download from `base_url`.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_view_radius")]
    pub view_radius: i32,
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_view_radius() -> i32 {
    DEFAULT_VIEW_RADIUS
}

impl MapperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// The local mirror, if one is configured.
    pub fn data_dir(&self) -> Option<&str> {
        let dir = self.data_dir.trim();
        (!dir.is_empty()).then_some(dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), MapperError> {
        let mapper = &self.mapper;
        if mapper.data_dir().is_none()
            && !(mapper.base_url.starts_with("http://") || mapper.base_url.starts_with("https://"))
        {
            return Err(MapperError::Config(format!(
                "mapper.base_url must be an http(s) URL, got '{}'",
                mapper.base_url
            )));
        }
        if mapper.timeout_seconds == 0 {
            return Err(MapperError::Config(
                "mapper.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !(0..=MAX_VIEW_RADIUS).contains(&mapper.view_radius) {
            return Err(MapperError::Config(format!(
                "mapper.view_radius must be between 0 and {}, got {}",
                MAX_VIEW_RADIUS, mapper.view_radius
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(MapperError::Config(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mapper: MapperConfig {
                base_url: "https://mume.org/mapdata/v1/".to_string(),
                data_dir: String::new(),
                timeout_seconds: default_timeout_seconds(),
                view_radius: default_view_radius(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("mumemap.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mapper.view_radius, 20);
        assert_eq!(config.mapper.timeout(), Duration::from_secs(10));
        assert_eq!(config.mapper.data_dir(), None);
    }

    #[test]
    fn test_optional_fields_default() {
        let config: Config = toml::from_str(
            r#"
            [mapper]
            base_url = "https://example.org/map/"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.mapper.timeout_seconds, 10);
        assert_eq!(config.mapper.view_radius, DEFAULT_VIEW_RADIUS);
        assert_eq!(config.logging.file, None);
    }

    fn rejected(mutate: impl FnOnce(&mut Config)) -> bool {
        let mut config = Config::default();
        mutate(&mut config);
        matches!(config.validate(), Err(MapperError::Config(_)))
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(rejected(|c| c.mapper.base_url = "ftp://x".into()));
        assert!(rejected(|c| c.mapper.timeout_seconds = 0));
        assert!(rejected(|c| c.mapper.view_radius = -1));
        assert!(rejected(|c| c.mapper.view_radius = MAX_VIEW_RADIUS + 1));
        assert!(rejected(|c| c.logging.level = "loud".into()));
        assert!(!rejected(|c| c.logging.level = "DEBUG".into()));
    }

    #[test]
    fn test_data_dir_overrides_base_url() {
        let mut config = Config::default();
        config.mapper.base_url = String::new();
        config.mapper.data_dir = " ./mapdata ".into();
        assert!(config.validate().is_ok());
        assert_eq!(config.mapper.data_dir(), Some("./mapdata"));
    }

    #[tokio::test]
    async fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mumemap.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.mapper.base_url, "https://mume.org/mapdata/v1/");
        assert_eq!(config.logging.file.as_deref(), Some("mumemap.log"));
    }

    #[tokio::test]
    async fn test_load_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[mapper]\nbase_url = \"nope\"\n[logging]\nlevel = \"info\"\n")
            .await
            .unwrap();
        let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("base_url"));
        assert!(Config::load("/nonexistent/mumemap.toml").await.is_err());
    }
}
