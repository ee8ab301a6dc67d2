//! Reward crediting.
//!
//! Session distance is credited in 0.1 km quanta. The engine remembers the
//! highest quantum already paid (the high-water mark) and only ever pays the
//! quanta above it, so repeated or bursty updates can never credit the same
//! stretch of distance twice.
//!
//! Quanta are counted as integers. Summing many short GPS legs in floating
//! point lands a hair below round values (ten legs of 0.1 km add up to
//! 0.9999999999999999), so a small tolerance is applied before flooring.
//! The reported high-water mark is capped at the furthest distance actually
//! seen, so it never runs ahead of the session's cumulative distance even when
//! the tolerance pays a boundary a hair early.

use crate::config::RewardConfig;
use crate::{Profile, RewardCreditEvent};

pub const QUANTUM_KM: f64 = 0.1;
const QUANTA_PER_KM: u64 = 10;
const QUANTIZE_TOLERANCE: f64 = 1e-9;

/// Whole 0.1 km quanta contained in `km`
pub fn quantize_km(km: f64) -> u64 {
    if !km.is_finite() || km <= 0.0 {
        return 0;
    }
    (km * QUANTA_PER_KM as f64 + QUANTIZE_TOLERANCE).floor() as u64
}

/// Level reached at a lifetime distance: one level per whole kilometre, starting at 1
pub fn level_for_distance(total_km: f64) -> u32 {
    if !total_km.is_finite() || total_km <= 0.0 {
        return 1;
    }
    (total_km + QUANTIZE_TOLERANCE).floor() as u32 + 1
}

#[derive(Clone, Debug)]
pub struct RewardEngine {
    config: RewardConfig,
    baseline_total_km: f64,
    recorded_level: u32,
    credited_quanta: u64,
    furthest_km: f64,
}

impl RewardEngine {
    /// Engine for a fresh session on top of the profile's lifetime totals
    pub fn new(config: RewardConfig, profile: &Profile) -> Self {
        Self {
            config,
            baseline_total_km: profile.total_distance_km,
            recorded_level: profile.current_level,
            credited_quanta: 0,
            furthest_km: 0.0,
        }
    }

    fn units_per_quantum(&self) -> u64 {
        self.config.units_per_km / QUANTA_PER_KM
    }

    /// Credit any quanta crossed since the last credit.
    ///
    /// Calling this twice with the same distance yields an event only the
    /// first time. The engine never retries on its own.
    pub fn on_distance_update(
        &mut self,
        cumulative_km: f64,
        referral_count: u32,
    ) -> Option<RewardCreditEvent> {
        if cumulative_km.is_finite() {
            self.furthest_km = self.furthest_km.max(cumulative_km);
        }
        let quanta = quantize_km(cumulative_km);
        if quanta <= self.credited_quanta {
            return None;
        }

        let delta = quanta - self.credited_quanta;
        self.credited_quanta = quanta;

        let base_units = delta * self.units_per_quantum();
        let referral_bonus_units = base_units * u64::from(referral_count);

        let lifetime_km = self.baseline_total_km + self.last_credited_km();
        let new_level = level_for_distance(lifetime_km);
        let level_up_triggered = new_level > self.recorded_level;
        if level_up_triggered {
            tracing::info!("Level up: {} -> {}", self.recorded_level, new_level);
            self.recorded_level = new_level;
        }

        let event = RewardCreditEvent {
            base_units,
            referral_bonus_units,
            level_up_triggered,
            new_level: level_up_triggered.then_some(new_level),
            level_bonus_units: if level_up_triggered {
                self.config.level_up_bonus
            } else {
                0
            },
            distance_km: delta as f64 / QUANTA_PER_KM as f64,
        };

        tracing::debug!(
            "Credited {} quanta: {} base + {} referral units",
            delta,
            event.base_units,
            event.referral_bonus_units
        );
        Some(event)
    }

    /// High-water mark in kilometres, never past the furthest distance seen
    pub fn last_credited_km(&self) -> f64 {
        let credited = self.credited_quanta as f64 / QUANTA_PER_KM as f64;
        credited.min(self.furthest_km)
    }

    pub fn credited_quanta(&self) -> u64 {
        self.credited_quanta
    }

    pub fn recorded_level(&self) -> u32 {
        self.recorded_level
    }
}
