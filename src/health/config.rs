//! Health test configuration.
//!
//! Cutoffs are derived from these values when a `HealthState` is
//! created and stay fixed for its lifetime.

use super::apt::DEFAULT_WINDOW_SIZE;
use crate::source::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the continuous health tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Oversampling rate: raw deltas consumed per output bit.
    pub osr: u32,
    /// APT observation window size in deltas.
    pub apt_window_size: u32,
    /// Length of the NTG.1 startup test in deltas.
    pub startup_samples: u32,
    /// Deltas excluded from RCT/APT after a noise source switch.
    pub switch_grace_samples: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            osr: 3,
            apt_window_size: DEFAULT_WINDOW_SIZE,
            startup_samples: 1024, // AIS 20/31 startup test length
            switch_grace_samples: 64,
        }
    }
}

impl HealthConfig {
    /// Creates a configuration with the given oversampling rate.
    pub fn with_osr(osr: u32) -> Self {
        Self {
            osr,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=255).contains(&self.osr) {
            return Err(ConfigError::InvalidOsr(self.osr));
        }
        if !(16..=65_536).contains(&self.apt_window_size) {
            return Err(ConfigError::InvalidWindowSize(self.apt_window_size));
        }
        if self.startup_samples == 0 {
            return Err(ConfigError::InvalidStartupLength);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Oversampling rate outside `1..=255`.
    #[error("invalid oversampling rate {0} (must be 1-255)")]
    InvalidOsr(u32),
    /// APT window size outside `16..=65536`.
    #[error("invalid APT window size {0} (must be 16-65536)")]
    InvalidWindowSize(u32),
    /// Startup test of zero samples.
    #[error("startup test length must be non-zero")]
    InvalidStartupLength,
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Health test parameters.
    #[serde(default)]
    pub health: HealthConfig,
    /// Simulated timer used by the demo binary.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.health.validate()?;
        Ok(config)
    }
}
