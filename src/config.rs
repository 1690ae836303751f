//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

/// Shortest sampling interval accepted (1 ms)
const MIN_INTERVAL_S: f64 = 0.001;

/// Longest sampling interval accepted (one day)
const MAX_INTERVAL_S: f64 = 86_400.0;

/// Upper bound on upload retries
const MAX_RETRIES: u32 = 10;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sampling cadence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_position_interval_s")]
    pub position_interval_s: f64,

    #[serde(default = "default_power_interval_s")]
    pub power_interval_s: f64,
}

/// Buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    /// Flush happens once the buffer holds more than this many observations
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

/// Upload endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub url: String,

    #[serde(default)]
    pub tagged_observations: bool,

    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Position provider configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PositionConfig {
    /// JSON file holding the latest fix, written by an external locator
    #[serde(default)]
    pub fix_file: Option<PathBuf>,
}

/// Power provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PowerConfig {
    #[serde(default = "default_capacity_file")]
    pub capacity_file: PathBuf,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Immutable runtime parameters of a session
///
/// Derived from [`Config`] once and handed to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub position_interval: Duration,
    pub power_interval: Duration,
    pub max_items: usize,
    pub url: String,
}

// Default value functions
fn default_position_interval_s() -> f64 { 5.0 }
fn default_power_interval_s() -> f64 { 10.0 }

fn default_max_items() -> usize { 10 }

fn default_retry_base_delay_ms() -> u64 { 500 }

fn default_capacity_file() -> PathBuf { PathBuf::from("/sys/class/power_supply/BAT0/capacity") }

fn default_file_prefix() -> String { "telemetry-relay.log".to_string() }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            position_interval_s: default_position_interval_s(),
            power_interval_s: default_power_interval_s(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_items: default_max_items() }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self { capacity_file: default_capacity_file() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { directory: None, file_prefix: default_file_prefix() }
    }
}

fn invalid(msg: impl std::fmt::Display) -> RelayError {
    RelayError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_relay::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The immutable (intervals, threshold, url) tuple a session runs with
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            position_interval: Duration::from_secs_f64(self.sampling.position_interval_s),
            power_interval: Duration::from_secs_f64(self.sampling.power_interval_s),
            max_items: self.buffer.max_items,
            url: self.upload.url.clone(),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("position_interval_s", self.sampling.position_interval_s),
            ("power_interval_s", self.sampling.power_interval_s),
        ] {
            if !value.is_finite() || value < MIN_INTERVAL_S || value > MAX_INTERVAL_S {
                return Err(invalid(format!(
                    "{} must be between {} and {} seconds",
                    name, MIN_INTERVAL_S, MAX_INTERVAL_S
                )));
            }
        }

        if self.buffer.max_items == 0 {
            return Err(invalid("max_items must be greater than 0"));
        }

        validate_url(&self.upload.url)?;

        if self.upload.max_retries > MAX_RETRIES {
            return Err(invalid(format!("max_retries must be at most {}", MAX_RETRIES)));
        }

        if self.upload.retry_base_delay_ms == 0 || self.upload.retry_base_delay_ms > 60000 {
            return Err(invalid("retry_base_delay_ms must be between 1 and 60000"));
        }

        if self.logging.directory.is_some() && self.logging.file_prefix.is_empty() {
            return Err(invalid("logging file_prefix cannot be empty when a directory is set"));
        }

        Ok(())
    }
}

/// Check that `url` is an absolute http or https URI with a host
pub fn validate_url(url: &str) -> Result<http::Uri> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| RelayError::InvalidEndpoint(format!("{}: {}", url, e)))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(RelayError::InvalidEndpoint(format!(
                "{}: scheme must be http or https",
                url
            )))
        }
    }

    if uri.host().map_or(true, str::is_empty) {
        return Err(RelayError::InvalidEndpoint(format!("{}: missing host", url)));
    }

    Ok(uri)
}
