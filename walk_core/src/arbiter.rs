//! Sensor-source arbitration and the distance-derived step estimator.
//!
//! The arbiter owns the [`ConfidenceTier`] state machine:
//!
//! ```text
//!   Low --valid motion sample--------------> High
//!   Low --grace deadline, too few valid----> Medium
//!   Low/High --motion unavailable/denied---> Medium
//!   High --grace deadline, too few valid---> Medium
//!   Medium --valid motion sample-----------> High   (estimator re-synced)
//! ```
//!
//! Only in `Medium` does distance turn into steps. In every other tier the
//! estimator follows the cumulative distance without counting, so switching
//! tiers never double counts or rewrites steps already attributed.

use crate::config::ArbiterConfig;
use crate::{ConfidenceTier, MotionSample};

/// Converts distance into steps using a fixed stride, keeping the fractional
/// remainder between updates.
#[derive(Clone, Debug)]
pub struct DistanceStepEstimator {
    stride_m: f64,
    synced_km: f64,
    carry_m: f64,
    total_steps: u64,
}

impl DistanceStepEstimator {
    pub fn new(stride_m: f64) -> Self {
        Self {
            stride_m,
            synced_km: 0.0,
            carry_m: 0.0,
            total_steps: 0,
        }
    }

    /// Add travelled metres and return the whole steps they complete
    pub fn add_meters(&mut self, metres: f64) -> u64 {
        if !metres.is_finite() || metres <= 0.0 || self.stride_m <= 0.0 {
            return 0;
        }

        self.carry_m += metres;
        if self.carry_m < self.stride_m {
            return 0;
        }

        let steps = (self.carry_m / self.stride_m).floor() as u64;
        self.carry_m -= steps as f64 * self.stride_m;
        self.total_steps += steps;
        steps
    }

    /// Count the distance added since the last sync point
    pub fn on_cumulative_km(&mut self, cumulative_km: f64) -> u64 {
        if cumulative_km <= self.synced_km {
            return 0;
        }
        let delta_m = (cumulative_km - self.synced_km) * 1000.0;
        self.synced_km = cumulative_km;
        self.add_meters(delta_m)
    }

    /// Move the sync point without counting anything.
    ///
    /// Pending carry-over is discarded. This loses up to one stride of
    /// distance every time the accelerometer takes over again.
    pub fn resync(&mut self, cumulative_km: f64) {
        if self.carry_m > 0.0 {
            tracing::debug!("Discarding {:.3}m of estimator carry-over", self.carry_m);
        }
        self.synced_km = cumulative_km;
        self.carry_m = 0.0;
    }

    pub fn carry_m(&self) -> f64 {
        self.carry_m
    }

    pub fn stride_m(&self) -> f64 {
        self.stride_m
    }

    pub fn synced_km(&self) -> f64 {
        self.synced_km
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }
}

/// How the arbiter judged a motion sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleClass {
    /// Missing or non-finite axis
    Malformed,
    /// Looks like a phone lying still, not proof the sensor tracks motion
    Static,
    /// Real motion data, route it to the detector
    Valid,
}

/// A tier change the session should report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierTransition {
    pub from: ConfidenceTier,
    pub to: ConfidenceTier,
}

#[derive(Clone, Debug)]
pub struct SensorArbiter {
    config: ArbiterConfig,
    gravity: f64,
    tier: ConfidenceTier,
    deadline_ms: u64,
    deadline_checked: bool,
    samples_seen: u32,
    valid_samples: u32,
    estimator: DistanceStepEstimator,
}

impl SensorArbiter {
    /// Start arbitration at `started_at_ms`, tier Low
    pub fn new(config: ArbiterConfig, gravity: f64, stride_m: f64, started_at_ms: u64) -> Self {
        let deadline_ms = started_at_ms.saturating_add(config.grace_ms);
        Self {
            config,
            gravity,
            tier: ConfidenceTier::Low,
            deadline_ms,
            deadline_checked: false,
            samples_seen: 0,
            valid_samples: 0,
            estimator: DistanceStepEstimator::new(stride_m),
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        self.tier
    }

    /// Distance-derived estimate is the authoritative step source
    pub fn estimating(&self) -> bool {
        self.tier == ConfidenceTier::Medium
    }

    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms
    }

    pub fn valid_samples(&self) -> u32 {
        self.valid_samples
    }

    pub fn estimator(&self) -> &DistanceStepEstimator {
        &self.estimator
    }

    /// Classify a motion sample, acquiring High tier on real motion
    pub fn on_motion_sample(
        &mut self,
        sample: &MotionSample,
        cumulative_km: f64,
    ) -> (SampleClass, Option<TierTransition>) {
        let Some(raw) = sample.raw_magnitude() else {
            return (SampleClass::Malformed, None);
        };

        self.samples_seen += 1;
        let deviation = (raw - self.gravity).abs();
        if deviation <= self.config.deviation_epsilon && self.samples_seen <= self.config.sample_floor {
            return (SampleClass::Static, None);
        }

        self.valid_samples += 1;
        let transition = if self.tier != ConfidenceTier::High {
            self.estimator.resync(cumulative_km);
            tracing::info!("Accelerometer active - precise step counting enabled");
            self.transition(ConfidenceTier::High)
        } else {
            None
        };
        (SampleClass::Valid, transition)
    }

    /// Resolve the startup grace window once its deadline has passed
    pub fn check_deadline(&mut self, now_ms: u64) -> Option<TierTransition> {
        if self.deadline_checked || now_ms < self.deadline_ms {
            return None;
        }
        self.deadline_checked = true;

        if self.valid_samples >= self.config.min_valid_samples {
            return None;
        }
        tracing::info!(
            "Only {} valid accelerometer samples after {}ms, switching to distance estimate",
            self.valid_samples,
            self.config.grace_ms
        );
        self.transition(ConfidenceTier::Medium)
    }

    /// The motion source will never deliver (missing sensor or denied access)
    pub fn motion_lost(&mut self) -> Option<TierTransition> {
        self.deadline_checked = true;
        self.transition(ConfidenceTier::Medium)
    }

    /// Feed the cumulative session distance, returning estimated steps
    pub fn on_distance(&mut self, cumulative_km: f64) -> u64 {
        if self.estimating() {
            self.estimator.on_cumulative_km(cumulative_km)
        } else {
            self.estimator.resync(cumulative_km);
            0
        }
    }

    fn transition(&mut self, to: ConfidenceTier) -> Option<TierTransition> {
        if self.tier == to {
            return None;
        }
        let from = self.tier;
        self.tier = to;
        tracing::info!("Confidence tier {} -> {}", from, to);
        Some(TierTransition { from, to })
    }
}
