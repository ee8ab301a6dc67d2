//! Peak-detection step detector.
//!
//! Each accelerometer sample is reduced to a gravity-free magnitude and pushed
//! into a small FIFO window. The sample at the window's center is a candidate
//! peak when it clears the window mean by a threshold and is a true local
//! maximum. A two-state machine then confirms the step once the signal falls
//! back below a fraction of the recorded peak:
//!
//! ```text
//!   Idle --(candidate peak, cooldown elapsed)--> InStep{peak}
//!   InStep{peak} --(mid < peak * drop_ratio)--> Idle   [emit StepEvent]
//! ```

use crate::config::DetectorConfig;
use crate::{MotionSample, StepEvent};
use std::collections::VecDeque;

/// Fixed-capacity FIFO of the most recent normalized magnitudes
#[derive(Clone, Debug)]
pub struct MagnitudeWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MagnitudeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest once full
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn mid_index(&self) -> usize {
        self.capacity / 2
    }

    /// Value at the center index, once the window is full
    pub fn mid(&self) -> Option<f64> {
        if self.is_full() {
            self.values.get(self.mid_index()).copied()
        } else {
            None
        }
    }

    /// Center value is >= every value before and after it
    pub fn mid_is_local_max(&self) -> bool {
        let Some(mid) = self.mid() else {
            return false;
        };
        let idx = self.mid_index();
        self.values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .all(|(_, v)| mid >= *v)
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DetectorState {
    Idle,
    InStep { peak: f64 },
}

/// Accelerometer step detector
#[derive(Clone, Debug)]
pub struct PeakDetector {
    config: DetectorConfig,
    window: MagnitudeWindow,
    state: DetectorState,
    last_step_ms: Option<u64>,
    total_steps: u64,
}

impl PeakDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let window = MagnitudeWindow::new(config.window_size);
        Self {
            config,
            window,
            state: DetectorState::Idle,
            last_step_ms: None,
            total_steps: 0,
        }
    }

    /// Gravity-free magnitude of a sample, or None for malformed samples
    pub fn normalized_magnitude(&self, sample: &MotionSample) -> Option<f64> {
        let raw = sample.raw_magnitude()?;
        if sample.includes_gravity {
            Some((raw - self.config.gravity).abs())
        } else {
            Some(raw)
        }
    }

    /// Process one sample. Returns a step when one is confirmed.
    ///
    /// Malformed samples are dropped without touching any state.
    pub fn on_sample(&mut self, sample: &MotionSample) -> Option<StepEvent> {
        let magnitude = self.normalized_magnitude(sample)?;
        let now = sample.timestamp_ms;

        self.window.push(magnitude);

        // Not enough history yet
        let mid = self.window.mid()?;
        let mean = self.window.mean();

        let is_peak = mid > mean + self.config.threshold && self.window.mid_is_local_max();

        if is_peak && self.state == DetectorState::Idle && self.cooldown_elapsed(now) {
            tracing::trace!("Candidate peak {:.3} (mean {:.3}) at {}ms", mid, mean, now);
            self.state = DetectorState::InStep { peak: mid };
        }

        if let DetectorState::InStep { peak } = self.state {
            if mid < peak * self.config.drop_ratio {
                self.state = DetectorState::Idle;
                self.last_step_ms = Some(now);
                self.total_steps += 1;
                tracing::debug!("Step confirmed at {}ms (peak {:.3})", now, peak);
                return Some(StepEvent {
                    timestamp_ms: now,
                    peak_magnitude: peak,
                });
            }
        }

        None
    }

    fn cooldown_elapsed(&self, now: u64) -> bool {
        match self.last_step_ms {
            Some(last) => now.saturating_sub(last) > self.config.cooldown_ms,
            None => true,
        }
    }

    /// Process a batch of samples and return all detected steps.
    pub fn on_batch(&mut self, samples: &[MotionSample]) -> Vec<StepEvent> {
        samples.iter().filter_map(|s| self.on_sample(s)).collect()
    }

    pub fn window(&self) -> &MagnitudeWindow {
        &self.window
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn last_step_ms(&self) -> Option<u64> {
        self.last_step_ms
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.state = DetectorState::Idle;
        self.last_step_ms = None;
        self.total_steps = 0;
    }
}
