//! Per-step haptic and audio feedback.
//!
//! The device behind [`FeedbackDevice`] is platform specific; the tracker only
//! needs to acquire it when a session starts, pulse it for counted steps, and
//! release it when the session stops.

use crate::{Result, StepSettings, StepSource};
use std::time::Duration;

/// Vibration pulse per step
pub const STEP_VIBRATION: Duration = Duration::from_millis(25);

/// Short sine blip played per step when sound is enabled
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tone {
    pub frequency_hz: f64,
    pub gain: f64,
    pub duration: Duration,
}

impl Tone {
    pub const STEP: Tone = Tone {
        frequency_hz: 600.0,
        gain: 0.08,
        duration: Duration::from_millis(60),
    };
}

pub trait FeedbackDevice {
    fn acquire(&mut self) -> Result<()>;
    fn release(&mut self);
    fn vibrate(&mut self, duration: Duration);
    fn play_tone(&mut self, tone: &Tone);
}

/// Drives a feedback device from counted steps, honouring the user's toggles
pub struct StepFeedback<D: FeedbackDevice> {
    device: D,
    vibration_enabled: bool,
    sound_enabled: bool,
    max_burst: u32,
    acquired: bool,
}

impl<D: FeedbackDevice> StepFeedback<D> {
    pub fn new(device: D, settings: &StepSettings, max_burst: u32) -> Self {
        Self {
            device,
            vibration_enabled: settings.vibration_enabled,
            sound_enabled: settings.sound_enabled,
            max_burst,
            acquired: false,
        }
    }

    pub fn apply_settings(&mut self, settings: &StepSettings) {
        self.vibration_enabled = settings.vibration_enabled;
        self.sound_enabled = settings.sound_enabled;
    }

    fn enabled(&self) -> bool {
        self.vibration_enabled || self.sound_enabled
    }

    /// Acquire the device if any feedback is enabled.
    ///
    /// Acquisition failure is logged and feedback stays off for the session.
    pub fn start(&mut self) {
        if self.acquired || !self.enabled() {
            return;
        }
        match self.device.acquire() {
            Ok(()) => self.acquired = true,
            Err(e) => tracing::warn!("Step feedback unavailable: {}", e),
        }
    }

    pub fn stop(&mut self) {
        if self.acquired {
            self.device.release();
            self.acquired = false;
        }
    }

    pub fn is_active(&self) -> bool {
        self.acquired
    }

    /// Pulse for a batch of counted steps; returns the pulses emitted.
    ///
    /// Estimated steps arrive in bursts after each GPS fix and are capped at
    /// `max_burst` pulses.
    pub fn on_steps(&mut self, source: StepSource, count: u64) -> u32 {
        if !self.acquired || count == 0 {
            return 0;
        }
        let pulses = match source {
            StepSource::Accelerometer => u32::try_from(count).unwrap_or(u32::MAX),
            StepSource::DistanceEstimate => count.min(u64::from(self.max_burst)) as u32,
        };
        for _ in 0..pulses {
            if self.vibration_enabled {
                self.device.vibrate(STEP_VIBRATION);
            }
            if self.sound_enabled {
                self.device.play_tone(&Tone::STEP);
            }
        }
        pulses
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: FeedbackDevice> Drop for StepFeedback<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Device that only logs, for headless runs
#[derive(Debug, Default)]
pub struct LogDevice;

impl FeedbackDevice for LogDevice {
    fn acquire(&mut self) -> Result<()> {
        tracing::debug!("Feedback device acquired");
        Ok(())
    }

    fn release(&mut self) {
        tracing::debug!("Feedback device released");
    }

    fn vibrate(&mut self, duration: Duration) {
        tracing::trace!("vibrate {:?}", duration);
    }

    fn play_tone(&mut self, tone: &Tone) {
        tracing::trace!("tone {} Hz for {:?}", tone.frequency_hz, tone.duration);
    }
}

/// Device that records calls
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub acquired: u32,
    pub released: u32,
    pub vibrations: u32,
    pub tones: u32,
    pub fail_acquire: bool,
}

#[cfg(test)]
impl FeedbackDevice for RecordingDevice {
    fn acquire(&mut self) -> Result<()> {
        if self.fail_acquire {
            return Err(crate::Error::Other("no audio output".into()));
        }
        self.acquired += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.released += 1;
    }

    fn vibrate(&mut self, _duration: Duration) {
        self.vibrations += 1;
    }

    fn play_tone(&mut self, _tone: &Tone) {
        self.tones += 1;
    }
}
