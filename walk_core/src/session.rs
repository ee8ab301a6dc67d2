//! Tracking session controller.
//!
//! Owns the lifecycle (`Idle --start--> Tracking --stop--> Idle`) and the
//! per-session pipeline: peak detector, sensor arbiter, distance accumulator
//! and reward engine. All state is explicit and owned; [`SessionController::handle`]
//! takes one input and returns whatever the pipeline emitted in response.
//!
//! Stopping freezes the counters for inspection. They are discarded by the
//! next `start` or by an explicit `reset`.

use crate::arbiter::{SampleClass, SensorArbiter, TierTransition};
use crate::detector::PeakDetector;
use crate::distance::DistanceAccumulator;
use crate::rewards::RewardEngine;
use crate::{
    Config, ConfidenceTier, GeoFix, MotionSample, Notice, Profile, SessionOutput, SessionPhase,
    SessionSnapshot, StepSettings, StepSource, TrackingEvent,
};

/// Pipeline state for one tracking session
#[derive(Clone, Debug)]
struct ActiveSession {
    started_at_ms: u64,
    stopped_at_ms: Option<u64>,
    detector: PeakDetector,
    arbiter: SensorArbiter,
    accumulator: DistanceAccumulator,
    rewards: RewardEngine,
    referral_count: u32,
    accelerometer_steps: u64,
    estimated_steps: u64,
    credited_units: u64,
    notices_sent: Vec<Notice>,
    dropped_samples: u64,
}

impl ActiveSession {
    fn new(config: &Config, settings: &StepSettings, profile: &Profile, now_ms: u64) -> Self {
        Self {
            started_at_ms: now_ms,
            stopped_at_ms: None,
            detector: PeakDetector::new(config.detector.clone()),
            arbiter: SensorArbiter::new(
                config.arbiter.clone(),
                config.detector.gravity,
                settings.stride_length_m,
                now_ms,
            ),
            accumulator: DistanceAccumulator::new(config.distance.clone()),
            rewards: RewardEngine::new(config.rewards.clone(), profile),
            referral_count: profile.referral_count,
            accelerometer_steps: 0,
            estimated_steps: 0,
            credited_units: 0,
            notices_sent: Vec::new(),
            dropped_samples: 0,
        }
    }

    fn steps(&self) -> u64 {
        self.accelerometer_steps + self.estimated_steps
    }

    fn notice_once(&mut self, notice: Notice, outputs: &mut Vec<SessionOutput>) {
        if !self.notices_sent.contains(&notice) {
            tracing::warn!("{}", notice);
            self.notices_sent.push(notice);
            outputs.push(SessionOutput::Notice(notice));
        }
    }

    fn on_motion(&mut self, sample: &MotionSample, outputs: &mut Vec<SessionOutput>) {
        let cumulative_km = self.accumulator.cumulative_km();
        let (class, transition) = self.arbiter.on_motion_sample(sample, cumulative_km);
        push_transition(transition, sample.timestamp_ms, outputs);

        match class {
            SampleClass::Malformed => {
                self.dropped_samples += 1;
                tracing::trace!("Dropped malformed motion sample at {}ms", sample.timestamp_ms);
            }
            SampleClass::Static => {}
            SampleClass::Valid => {
                if let Some(step) = self.detector.on_sample(sample) {
                    self.accelerometer_steps += 1;
                    outputs.push(SessionOutput::Steps {
                        source: StepSource::Accelerometer,
                        count: 1,
                        timestamp_ms: step.timestamp_ms,
                    });
                }
            }
        }
    }

    fn on_fix(&mut self, fix: &GeoFix, outputs: &mut Vec<SessionOutput>) {
        let increment_km = self.accumulator.on_fix(fix);
        if increment_km <= 0.0 {
            return;
        }
        let cumulative_km = self.accumulator.cumulative_km();

        let estimated = self.arbiter.on_distance(cumulative_km);
        if estimated > 0 {
            self.estimated_steps += estimated;
            tracing::debug!(
                "Distance estimate: +{} steps ({:.1}m), total {}",
                estimated,
                increment_km * 1000.0,
                self.steps()
            );
            outputs.push(SessionOutput::Steps {
                source: StepSource::DistanceEstimate,
                count: estimated,
                timestamp_ms: fix.timestamp_ms,
            });
        }

        // Same call as the distance update, so a credit never sees stale distance
        if let Some(credit) = self
            .rewards
            .on_distance_update(cumulative_km, self.referral_count)
        {
            self.credited_units += credit.total_units();
            outputs.push(SessionOutput::Credit(credit));
        }
    }

    fn snapshot(&self, phase: SessionPhase) -> SessionSnapshot {
        SessionSnapshot {
            phase,
            tier: self.arbiter.tier(),
            steps: self.steps(),
            accelerometer_steps: self.accelerometer_steps,
            estimated_steps: self.estimated_steps,
            distance_km: self.accumulator.cumulative_km(),
            last_credited_km: self.rewards.last_credited_km(),
            credited_units: self.credited_units,
            started_at_ms: Some(self.started_at_ms),
            stopped_at_ms: self.stopped_at_ms,
        }
    }
}

fn push_transition(
    transition: Option<TierTransition>,
    timestamp_ms: u64,
    outputs: &mut Vec<SessionOutput>,
) {
    if let Some(TierTransition { from, to }) = transition {
        outputs.push(SessionOutput::TierChanged {
            from,
            to,
            timestamp_ms,
        });
    }
}

/// Lifecycle owner for tracking sessions
#[derive(Clone, Debug)]
pub struct SessionController {
    config: Config,
    phase: SessionPhase,
    session: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            phase: SessionPhase::Idle,
            session: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase == SessionPhase::Tracking
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Begin a session with fresh state; nothing carries over from a prior one
    pub fn start(&mut self, now_ms: u64, settings: &StepSettings, profile: &Profile) {
        if self.is_tracking() {
            tracing::warn!("Start requested while tracking; restarting session");
        }
        self.session = Some(ActiveSession::new(&self.config, settings, profile, now_ms));
        self.phase = SessionPhase::Tracking;
        tracing::info!(
            "Tracking started (stride {:.3}m, {} referrals)",
            settings.stride_length_m,
            profile.referral_count
        );
    }

    /// Stop tracking and freeze the counters. Later inputs are ignored.
    pub fn stop(&mut self, now_ms: u64) -> Option<SessionSnapshot> {
        if !self.is_tracking() {
            return None;
        }
        self.phase = SessionPhase::Idle;
        let session = self.session.as_mut()?;
        session.stopped_at_ms = Some(now_ms);
        let snapshot = session.snapshot(SessionPhase::Idle);
        tracing::info!(
            "Tracking stopped: {} steps, {:.3}km, tier {}",
            snapshot.steps,
            snapshot.distance_km,
            snapshot.tier
        );
        Some(snapshot)
    }

    /// Discard all session counters. A running session keeps tracking from zero.
    pub fn reset(&mut self, now_ms: u64, settings: &StepSettings, profile: &Profile) {
        if self.is_tracking() {
            self.session = Some(ActiveSession::new(&self.config, settings, profile, now_ms));
            tracing::info!("Session counters reset while tracking");
        } else {
            self.session = None;
            tracing::info!("Session counters discarded");
        }
    }

    /// Feed one input through the pipeline
    pub fn handle(&mut self, event: &TrackingEvent) -> Vec<SessionOutput> {
        let mut outputs = Vec::new();
        if !self.is_tracking() {
            tracing::trace!("Ignoring input while idle: {:?}", event);
            return outputs;
        }
        let Some(session) = self.session.as_mut() else {
            return outputs;
        };

        let now_ms = event.timestamp_ms();
        push_transition(session.arbiter.check_deadline(now_ms), now_ms, &mut outputs);

        match event {
            TrackingEvent::Motion(sample) => session.on_motion(sample, &mut outputs),
            TrackingEvent::Fix(fix) => session.on_fix(fix, &mut outputs),
            TrackingEvent::MotionUnavailable { .. } => {
                session.notice_once(Notice::MotionUnavailable, &mut outputs);
                push_transition(session.arbiter.motion_lost(), now_ms, &mut outputs);
            }
            TrackingEvent::MotionDenied { .. } => {
                session.notice_once(Notice::MotionPermissionDenied, &mut outputs);
                push_transition(session.arbiter.motion_lost(), now_ms, &mut outputs);
            }
            TrackingEvent::LocationDenied { .. } => {
                session.notice_once(Notice::LocationPermissionDenied, &mut outputs);
            }
            TrackingEvent::Tick { .. } => {}
        }

        outputs
    }

    /// Current aggregate state; frozen values after stop, zeros after reset
    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.session {
            Some(session) => session.snapshot(self.phase),
            None => SessionSnapshot {
                phase: self.phase,
                ..SessionSnapshot::default()
            },
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        self.session
            .as_ref()
            .map(|s| s.arbiter.tier())
            .unwrap_or_default()
    }

    /// Malformed motion samples dropped so far this session
    pub fn dropped_samples(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.dropped_samples)
    }
}
