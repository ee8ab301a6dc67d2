//! Step settings persistence with file locking.
//!
//! Settings are validated here, at the write boundary; the tracking pipeline
//! assumes whatever it is handed has already passed [`StepSettings::validate`].

use crate::{state, Error, Result, StepSettings};
use std::path::Path;

pub const DEFAULT_HEIGHT_CM: f64 = 170.0;
pub const DEFAULT_STRIDE_M: f64 = 0.762;

/// Walking stride as a fraction of body height
const STRIDE_HEIGHT_RATIO: f64 = 0.413;

const MIN_HEIGHT_CM: f64 = 50.0;
const MAX_HEIGHT_CM: f64 = 272.0;
const MAX_STRIDE_M: f64 = 2.5;

/// Stride length estimated from body height
pub fn stride_for_height(height_cm: f64) -> f64 {
    height_cm / 100.0 * STRIDE_HEIGHT_RATIO
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            height_cm: DEFAULT_HEIGHT_CM,
            stride_length_m: DEFAULT_STRIDE_M,
            vibration_enabled: true,
            sound_enabled: false,
        }
    }
}

impl StepSettings {
    /// Settings calibrated from height, stride derived
    pub fn for_height(height_cm: f64) -> Self {
        Self {
            height_cm,
            stride_length_m: stride_for_height(height_cm),
            ..Self::default()
        }
    }

    /// Change height and re-derive the stride from it
    pub fn set_height(&mut self, height_cm: f64) {
        self.height_cm = height_cm;
        self.stride_length_m = stride_for_height(height_cm);
    }

    /// Reject values the step estimator cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.stride_length_m.is_finite() || self.stride_length_m <= 0.0 {
            return Err(Error::Settings(format!(
                "stride length must be positive, got {}",
                self.stride_length_m
            )));
        }
        if self.stride_length_m > MAX_STRIDE_M {
            return Err(Error::Settings(format!(
                "stride length {}m exceeds {}m",
                self.stride_length_m, MAX_STRIDE_M
            )));
        }
        if !self.height_cm.is_finite()
            || self.height_cm < MIN_HEIGHT_CM
            || self.height_cm > MAX_HEIGHT_CM
        {
            return Err(Error::Settings(format!(
                "height must be between {} and {} cm, got {}",
                MIN_HEIGHT_CM, MAX_HEIGHT_CM, self.height_cm
            )));
        }
        Ok(())
    }

    /// Load settings from a file with shared locking
    ///
    /// Returns default settings if the file doesn't exist.
    /// If the file is corrupted or out of range, logs a warning and returns defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(settings) = state::load_json::<StepSettings>(path, "step settings")? else {
            return Ok(Self::default());
        };
        match settings.validate() {
            Ok(()) => Ok(settings),
            Err(e) => {
                tracing::warn!("Stored settings rejected: {}. Using defaults.", e);
                Ok(Self::default())
            }
        }
    }

    /// Validate, then atomically write settings under an exclusive lock
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        state::save_json(self, path)?;
        tracing::info!(
            "Step settings updated: height {}cm, stride {:.3}m",
            self.height_cm,
            self.stride_length_m
        );
        Ok(())
    }

    /// Load settings, modify them, and save them back under the state lock
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut StepSettings) -> Result<()>,
    {
        let _lock = state::StateLock::acquire(path)?;
        let mut settings = Self::load(path)?;
        f(&mut settings)?;
        settings.save(path)?;
        Ok(settings)
    }
}
