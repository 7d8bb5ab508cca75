//! Configuration management for railcast
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::RailcastError;
use crate::features::ColumnDefaults;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for railcast
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RailcastConfig {
    /// Model artifact location
    #[serde(default)]
    pub artifact: ArtifactConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Values used for inputs the caller does not provide
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Path of the model bundle (JSON)
    #[serde(default = "default_artifact_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum request body size in KiB
    #[serde(default = "default_max_body_kb")]
    pub max_body_kb: usize,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Placeholder weather values and the timezone used to pick "today"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_wind")]
    pub wind10m_mean_kmh: f64,
    #[serde(default = "default_cloud_cover")]
    pub cloud_cover_mean_pct: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

// Default value functions
fn default_artifact_path() -> PathBuf {
    PathBuf::from("bundle_rf_catboost.json")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_kb() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_wind() -> f64 {
    ColumnDefaults::default().wind10m_mean_kmh
}

fn default_cloud_cover() -> f64 {
    ColumnDefaults::default().cloud_cover_mean_pct
}

fn default_timezone() -> String {
    "Europe/Istanbul".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: default_artifact_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            max_body_kb: default_max_body_kb(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            wind10m_mean_kmh: default_wind(),
            cloud_cover_mean_pct: default_cloud_cover(),
            timezone: default_timezone(),
        }
    }
}

impl RailcastConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // RAILCAST_SERVER__PORT=9000 overrides server.port
        builder = builder.add_source(
            Environment::with_prefix("RAILCAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: RailcastConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to deserialize configuration from {}", config_file.display()))?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("railcast").join("config.toml"))
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.artifact.path.as_os_str().is_empty() {
            self.artifact.path = default_artifact_path();
        }
        if self.server.host.is_empty() {
            self.server.host = default_host();
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = default_request_timeout();
        }
        if self.server.max_body_kb == 0 {
            self.server.max_body_kb = default_max_body_kb();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.defaults.timezone.is_empty() {
            self.defaults.timezone = default_timezone();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RailcastError::config("Server port must be between 1 and 65535").into());
        }

        if self.server.request_timeout_seconds > 300 {
            return Err(
                RailcastError::config("Request timeout cannot exceed 300 seconds").into(),
            );
        }

        let wind = self.defaults.wind10m_mean_kmh;
        if !wind.is_finite() || wind < 0.0 {
            return Err(RailcastError::config(format!(
                "Default wind speed must be a non-negative number, got {wind}"
            ))
            .into());
        }

        let cloud = self.defaults.cloud_cover_mean_pct;
        if !(0.0..=100.0).contains(&cloud) {
            return Err(RailcastError::config(format!(
                "Default cloud cover must be between 0 and 100 percent, got {cloud}"
            ))
            .into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(RailcastError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(RailcastError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        self.timezone()?;
        Ok(())
    }

    /// Configured timezone, parsed.
    pub fn timezone(&self) -> Result<Tz> {
        self.defaults.timezone.parse::<Tz>().map_err(|_| {
            RailcastError::config(format!("Unknown timezone '{}'", self.defaults.timezone)).into()
        })
    }

    #[must_use]
    pub fn column_defaults(&self) -> ColumnDefaults {
        ColumnDefaults {
            wind10m_mean_kmh: self.defaults.wind10m_mean_kmh,
            cloud_cover_mean_pct: self.defaults.cloud_cover_mean_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RailcastConfig::default();
        assert_eq!(config.artifact.path, PathBuf::from("bundle_rf_catboost.json"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.defaults.wind10m_mean_kmh, 10.0);
        assert_eq!(config.defaults.cloud_cover_mean_pct, 50.0);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Istanbul);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = RailcastConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_timezone() {
        let mut config = RailcastConfig::default();
        config.defaults.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("Unknown timezone"));
    }

    #[test]
    fn test_config_validation_numeric_ranges() {
        let mut config = RailcastConfig::default();
        config.defaults.cloud_cover_mean_pct = 120.0;
        assert!(config.validate().is_err());

        let mut config = RailcastConfig::default();
        config.server.request_timeout_seconds = 500;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout cannot exceed"));
    }

    #[test]
    fn test_apply_defaults_fills_empty_values() {
        let mut config = RailcastConfig::default();
        config.logging.format = String::new();
        config.server.max_body_kb = 0;
        config.apply_defaults();
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.server.max_body_kb, 64);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[logging]\nformat = \"json\"\n\n[artifact]\npath = \"models/bundle.json\""
        )
        .unwrap();

        let config = RailcastConfig::load_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.artifact.path, PathBuf::from("models/bundle.json"));
        // untouched sections keep their defaults
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_environment_variable_override() {
        // SAFETY: Test environment, the variable is only read by this test
        unsafe {
            env::set_var("RAILCAST_DEFAULTS__WIND10M_MEAN_KMH", "17.5");
        }

        let result = RailcastConfig::load_from_path(Some(PathBuf::from("/nonexistent/railcast.toml")));

        // SAFETY: Test cleanup
        unsafe {
            env::remove_var("RAILCAST_DEFAULTS__WIND10M_MEAN_KMH");
        }

        let config = result.unwrap();
        assert_eq!(config.defaults.wind10m_mean_kmh, 17.5);
        assert_eq!(config.column_defaults().wind10m_mean_kmh, 17.5);
    }

    #[test]
    fn test_config_path_generation() {
        if let Some(path) = RailcastConfig::get_config_path() {
            assert!(path.to_string_lossy().contains("railcast"));
            assert!(path.to_string_lossy().contains("config.toml"));
        }
    }
}
