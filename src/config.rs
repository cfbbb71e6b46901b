//! Configuration management for peerscout.
//!
//! Settings come from an optional TOML file. Every section and key has a
//! default, so an empty file (or no file at all) is a valid configuration.
//! Command line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::network::geolocation::{ACCESS_TOKEN_ENV, DEFAULT_GEOLOCATION_URL};
use crate::network::peer_discovery::DEFAULT_DIRECTORY_URL;
use crate::scout::ScoutSettings;
use crate::types::{parse_country_list, SearchCriteria};

/// Default config location: `~/.config/peerscout/config.toml` on Linux
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("peerscout")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: DirectoryConfig,
    pub geolocation: GeolocationConfig,
    pub probe: ProbeConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DIRECTORY_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub base_url: String,
    /// ipinfo.io token. Falls back to the IPINFO_ACCESS_TOKEN environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOLOCATION_URL.to_string(),
            access_token: None,
            timeout_secs: 5,
        }
    }
}

impl GeolocationConfig {
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Unset means "use search.max_latency_ms"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Comma separated two-letter codes, e.g. "CA,US"
    pub target_countries: String,
    pub max_latency_ms: u64,
    pub desired_count: usize,
    pub max_attempts: u32,
    pub attempt_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_budget_ms: Option<u64>,
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            target_countries: "CA,US".to_string(),
            max_latency_ms: 50,
            desired_count: 5,
            max_attempts: 5,
            attempt_delay_ms: 0,
            attempt_budget_ms: None,
            concurrency: 8,
        }
    }
}

const LOG_FORMATS: &[&str] = &["pretty", "json"];
const LOG_OUTPUTS: &[&str] = &["stderr", "file"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
    /// "stderr" or "file"
    pub output: String,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stderr".to_string(),
            file_path: "./logs/peerscout.log".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = default_config_path();
                if default_path.is_file() {
                    Self::load_from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, contents).map_err(write_err)?;
        Ok(())
    }

    /// Check everything a search needs before any request is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.criteria()?;
        if self.search.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::UnknownLogFormat(self.logging.format.clone()));
        }
        if !LOG_OUTPUTS.contains(&self.logging.output.as_str()) {
            return Err(ConfigError::UnknownLogOutput(self.logging.output.clone()));
        }
        Ok(())
    }

    pub fn criteria(&self) -> Result<SearchCriteria, ConfigError> {
        let countries = parse_country_list(&self.search.target_countries)?;
        Ok(SearchCriteria::new(
            countries,
            Duration::from_millis(self.search.max_latency_ms),
            self.search.desired_count,
            self.search.max_attempts,
        )?)
    }

    pub fn scout_settings(&self) -> ScoutSettings {
        ScoutSettings {
            concurrency: self.search.concurrency,
            attempt_delay: Duration::from_millis(self.search.attempt_delay_ms),
            attempt_budget: self.search.attempt_budget_ms.map(Duration::from_millis),
            probe_timeout: self.probe.timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory.timeout_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation.timeout_secs)
    }
}
