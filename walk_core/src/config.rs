//! Configuration file support for Walkcoin.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/walkcoin/config.toml`.
//! Every tuning constant of the tracking pipeline lives here; none of them
//! is considered authoritative, they are the latest field-tested defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub arbiter: ArbiterConfig,

    #[serde(default)]
    pub distance: DistanceConfig,

    #[serde(default)]
    pub rewards: RewardConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Peak detector tuning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    /// How far above the window mean the center sample must be (m/s²)
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Minimum gap between confirmed steps
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Fraction of the recorded peak the signal must fall below to confirm
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: f64,

    #[serde(default = "default_gravity")]
    pub gravity: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            cooldown_ms: default_cooldown_ms(),
            window_size: default_window_size(),
            drop_ratio: default_drop_ratio(),
            gravity: default_gravity(),
        }
    }
}

/// Sensor-source arbitration tuning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArbiterConfig {
    /// How long after start the accelerometer has to prove itself
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    #[serde(default = "default_min_valid_samples")]
    pub min_valid_samples: u32,

    /// Deviation from gravity that marks a sample as real motion
    #[serde(default = "default_deviation_epsilon")]
    pub deviation_epsilon: f64,

    /// Sample count after which any well-formed sample counts as valid
    #[serde(default = "default_sample_floor")]
    pub sample_floor: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            min_valid_samples: default_min_valid_samples(),
            deviation_epsilon: default_deviation_epsilon(),
            sample_floor: default_sample_floor(),
        }
    }
}

/// GPS noise filtering
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DistanceConfig {
    #[serde(default = "default_min_movement_m")]
    pub min_movement_m: f64,

    /// Fixes reporting a worse accuracy radius are ignored
    #[serde(default = "default_max_accuracy_m")]
    pub max_accuracy_m: Option<f64>,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            min_movement_m: default_min_movement_m(),
            max_accuracy_m: default_max_accuracy_m(),
        }
    }
}

/// Reward crediting parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardConfig {
    #[serde(default = "default_units_per_km")]
    pub units_per_km: u64,

    #[serde(default = "default_level_up_bonus")]
    pub level_up_bonus: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            units_per_km: default_units_per_km(),
            level_up_bonus: default_level_up_bonus(),
        }
    }
}

/// Step feedback parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedbackConfig {
    /// Cap on pulses fired for one batch of distance-estimated steps
    #[serde(default = "default_max_burst")]
    pub max_burst: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_burst: default_max_burst(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("walkcoin")
}

fn default_threshold() -> f64 {
    1.2
}

fn default_cooldown_ms() -> u64 {
    300
}

fn default_window_size() -> usize {
    6
}

fn default_drop_ratio() -> f64 {
    0.6
}

fn default_gravity() -> f64 {
    crate::STANDARD_GRAVITY
}

fn default_grace_ms() -> u64 {
    2000
}

fn default_min_valid_samples() -> u32 {
    5
}

fn default_deviation_epsilon() -> f64 {
    0.1
}

fn default_sample_floor() -> u32 {
    10
}

fn default_min_movement_m() -> f64 {
    10.0
}

fn default_max_accuracy_m() -> Option<f64> {
    Some(100.0)
}

fn default_units_per_km() -> u64 {
    100
}

fn default_level_up_bonus() -> u64 {
    500
}

fn default_max_burst() -> u32 {
    5
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("walkcoin").join("config.toml")
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if d.window_size < 3 {
            return Err(Error::Config(format!(
                "detector.window_size must be at least 3, got {}",
                d.window_size
            )));
        }
        if !(d.drop_ratio > 0.0 && d.drop_ratio < 1.0) {
            return Err(Error::Config(format!(
                "detector.drop_ratio must be in (0, 1), got {}",
                d.drop_ratio
            )));
        }
        if !d.threshold.is_finite() || d.threshold < 0.0 {
            return Err(Error::Config(format!(
                "detector.threshold must be a non-negative number, got {}",
                d.threshold
            )));
        }
        if !self.distance.min_movement_m.is_finite() || self.distance.min_movement_m < 0.0 {
            return Err(Error::Config(format!(
                "distance.min_movement_m must be a non-negative number, got {}",
                self.distance.min_movement_m
            )));
        }
        if self.rewards.units_per_km % 10 != 0 {
            return Err(Error::Config(format!(
                "rewards.units_per_km must be a multiple of 10 so a 0.1 km quantum pays whole units, got {}",
                self.rewards.units_per_km
            )));
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
