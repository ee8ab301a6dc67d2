//! Core domain types for the Walkcoin tracking engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Raw inputs (motion samples, geographic fixes, tracking events)
//! - Pipeline outputs (step events, credit events, notices)
//! - Session lifecycle and confidence tiers
//! - User-owned records (step settings, profile, transactions, summaries)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Gravity constant subtracted from acceleration-with-gravity magnitudes (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.8;

// ============================================================================
// Inputs
// ============================================================================

/// One 3-axis accelerometer reading.
///
/// Axes are optional because platforms deliver `null` axes on some devices.
/// Such samples are dropped by the pipeline without touching any state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MotionSample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    #[serde(default = "default_includes_gravity")]
    pub includes_gravity: bool,
    pub timestamp_ms: u64,
}

fn default_includes_gravity() -> bool {
    true
}

impl MotionSample {
    /// Sample with gravity included, the common case for phone sensors
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            includes_gravity: true,
            timestamp_ms,
        }
    }

    /// All three axes, or None when any axis is missing or not finite
    pub fn axes(&self) -> Option<[f64; 3]> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) if x.is_finite() && y.is_finite() && z.is_finite() => {
                Some([x, y, z])
            }
            _ => None,
        }
    }

    /// Euclidean magnitude of the raw reading
    pub fn raw_magnitude(&self) -> Option<f64> {
        self.axes()
            .map(|[x, y, z]| (x * x + y * y + z * z).sqrt())
    }
}

/// One geographic position fix
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    pub timestamp_ms: u64,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
            speed_mps: None,
            timestamp_ms,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    /// Coordinates are finite and inside the WGS84 range
    pub fn is_well_formed(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Everything a motion or location source can push into a tracking session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingEvent {
    Motion(MotionSample),
    Fix(GeoFix),
    /// The device has no accelerometer
    MotionUnavailable { timestamp_ms: u64 },
    /// The user refused motion access
    MotionDenied { timestamp_ms: u64 },
    /// The user refused location access
    LocationDenied { timestamp_ms: u64 },
    /// Clock advance with no sensor payload; drives the grace deadline
    Tick { timestamp_ms: u64 },
}

impl TrackingEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            TrackingEvent::Motion(sample) => sample.timestamp_ms,
            TrackingEvent::Fix(fix) => fix.timestamp_ms,
            TrackingEvent::MotionUnavailable { timestamp_ms }
            | TrackingEvent::MotionDenied { timestamp_ms }
            | TrackingEvent::LocationDenied { timestamp_ms }
            | TrackingEvent::Tick { timestamp_ms } => *timestamp_ms,
        }
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// A single footfall confirmed by the peak detector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepEvent {
    pub timestamp_ms: u64,
    pub peak_magnitude: f64,
}

/// Which path attributed a batch of steps
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepSource {
    Accelerometer,
    DistanceEstimate,
}

/// Current trust level in the step-counting mechanism
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// Neither path validated yet (startup grace period)
    #[default]
    Low,
    /// Distance-derived estimate is authoritative
    Medium,
    /// Accelerometer is live and validated
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reward units owed for newly crossed 0.1 km quanta
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardCreditEvent {
    pub base_units: u64,
    pub referral_bonus_units: u64,
    pub level_up_triggered: bool,
    pub new_level: Option<u32>,
    /// Fixed level-up bonus, zero when no level was gained
    pub level_bonus_units: u64,
    /// Distance covered by the credited quanta
    pub distance_km: f64,
}

impl RewardCreditEvent {
    pub fn total_units(&self) -> u64 {
        self.base_units + self.referral_bonus_units + self.level_bonus_units
    }
}

/// Non-fatal conditions the caller may surface to the user once
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    MotionPermissionDenied,
    MotionUnavailable,
    LocationPermissionDenied,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Notice::MotionPermissionDenied => {
                "motion access denied; estimating steps from distance"
            }
            Notice::MotionUnavailable => "no motion sensor; estimating steps from distance",
            Notice::LocationPermissionDenied => {
                "location access denied; distance and rewards are unavailable"
            }
        };
        f.write_str(text)
    }
}

/// One thing a session emitted in response to an input
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutput {
    Steps {
        source: StepSource,
        count: u64,
        timestamp_ms: u64,
    },
    Credit(RewardCreditEvent),
    TierChanged {
        from: ConfidenceTier,
        to: ConfidenceTier,
        timestamp_ms: u64,
    },
    Notice(Notice),
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Tracking,
}

/// Aggregate session state exposed to collaborators
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub tier: ConfidenceTier,
    pub steps: u64,
    pub accelerometer_steps: u64,
    pub estimated_steps: u64,
    pub distance_km: f64,
    pub last_credited_km: f64,
    pub credited_units: u64,
    pub started_at_ms: Option<u64>,
    pub stopped_at_ms: Option<u64>,
}

/// Journal record written once per finished session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub steps: u64,
    pub distance_km: f64,
    pub coins: u64,
    pub final_tier: ConfidenceTier,
}

// ============================================================================
// User-owned records
// ============================================================================

/// User step calibration and feedback preferences
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StepSettings {
    pub height_cm: f64,
    pub stride_length_m: f64,
    pub vibration_enabled: bool,
    pub sound_enabled: bool,
}

/// Profile fields the reward pipeline reads and the ledger writes
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub total_coins: u64,
    pub total_distance_km: f64,
    pub current_level: u32,
    pub referral_count: u32,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            total_coins: 0,
            total_distance_km: 0.0,
            current_level: 1,
            referral_count: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Walk,
    ReferralBonus,
    LevelUp,
}

/// A single coin movement recorded by the ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub id: Uuid,
    pub amount: u64,
    pub kind: TransactionKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Per-day totals across all sessions
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DailyWalkStats {
    pub date: NaiveDate,
    pub total_steps: u64,
    pub total_distance_km: f64,
    pub total_coins: u64,
    pub sessions_count: u32,
}
