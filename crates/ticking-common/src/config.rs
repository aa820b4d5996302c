//! Configuration structures for clocks and tick runs.
//!
//! Supports TOML deserialization with defaults for every field, so an empty
//! file is a valid configuration.

use crate::error::{TickingError, TickingResult};
use crate::time::ClockSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickingConfig {
    /// Clock configuration.
    pub clock: ClockConfig,

    /// Tick loop configuration.
    pub run: RunConfig,
}

/// Tick clock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Length of one tick.
    #[serde(with = "humantime_serde")]
    pub tick_len: Duration,

    /// Platform clock to read.
    pub source: ClockSource,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_len: Duration::from_secs(1),
            source: ClockSource::Monotonic,
        }
    }
}

impl ClockConfig {
    /// Check that the tick length is positive.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] for a zero tick length.
    pub fn validate(&self) -> TickingResult<()> {
        if self.tick_len.is_zero() {
            return Err(TickingError::InvalidConfiguration(
                "tick_len must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Tick loop configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many ticks (0 = run until interrupted).
    pub max_ticks: u64,

    /// Write a profiling report here when the run ends.
    pub profile_output: Option<PathBuf>,
}

impl TickingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Configuration file parsed");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`TickingError::InvalidConfiguration`] on the first invalid value.
    pub fn validate(&self) -> TickingResult<()> {
        self.clock.validate()
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
