//! Tracker shell.
//!
//! [`Tracker`] wires a [`SessionController`] to its side-effecting
//! collaborators: credits go to a [`ProfileLedger`], counted steps pulse a
//! [`StepFeedback`] device, and finished sessions become [`SessionSummary`]
//! records. [`spawn_tracker`] moves a tracker onto its own thread behind an
//! mpsc channel so producers on different threads share one ordered input
//! stream.

use crate::feedback::{FeedbackDevice, StepFeedback};
use crate::ledger::ProfileLedger;
use crate::session::SessionController;
use crate::{
    Config, Error, Result, SessionOutput, SessionSnapshot, SessionSummary, StepSettings,
    TrackingEvent,
};
use chrono::{DateTime, Utc};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use uuid::Uuid;

pub struct Tracker<L: ProfileLedger, D: FeedbackDevice> {
    controller: SessionController,
    ledger: L,
    feedback: StepFeedback<D>,
    settings: StepSettings,
}

fn to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

impl<L: ProfileLedger, D: FeedbackDevice> Tracker<L, D> {
    pub fn new(config: Config, settings: StepSettings, ledger: L, device: D) -> Self {
        let feedback = StepFeedback::new(device, &settings, config.feedback.max_burst);
        Self {
            controller: SessionController::new(config),
            ledger,
            feedback,
            settings,
        }
    }

    /// Start a session against the ledger's current profile
    pub fn start(&mut self, now_ms: u64) {
        self.controller
            .start(now_ms, &self.settings, self.ledger.profile());
        self.feedback.start();
    }

    /// Apply new settings. They take effect at the next start or reset.
    pub fn update_settings(&mut self, settings: StepSettings) {
        self.feedback.apply_settings(&settings);
        self.settings = settings;
    }

    /// Feed one input and act on the outputs.
    ///
    /// A ledger failure is returned after feedback for the batch has run; the
    /// session's high-water mark has already moved past the failed credit.
    pub fn handle(&mut self, event: &TrackingEvent) -> Result<Vec<SessionOutput>> {
        let outputs = self.controller.handle(event);
        let mut failure = None;

        for output in &outputs {
            match output {
                SessionOutput::Steps { source, count, .. } => {
                    self.feedback.on_steps(*source, *count);
                }
                SessionOutput::Credit(credit) => {
                    if let Err(e) = self.ledger.apply(credit) {
                        tracing::error!("Failed to record credit: {}", e);
                        failure.get_or_insert(e);
                    }
                }
                SessionOutput::TierChanged { from, to, .. } => {
                    tracing::info!("Confidence tier {} -> {}", from, to);
                }
                SessionOutput::Notice(notice) => {
                    tracing::warn!("{}", notice);
                }
            }
        }

        match failure {
            Some(e) => Err(Error::Ledger(e.to_string())),
            None => Ok(outputs),
        }
    }

    /// Stop the session, release feedback, and summarize what was tracked
    pub fn stop(&mut self, now_ms: u64) -> Option<SessionSummary> {
        let snapshot = self.controller.stop(now_ms)?;
        self.feedback.stop();
        Some(summarize(&snapshot, now_ms))
    }

    /// Discard session counters; a running session restarts from zero
    pub fn reset(&mut self, now_ms: u64) {
        self.controller
            .reset(now_ms, &self.settings, self.ledger.profile());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn feedback(&self) -> &StepFeedback<D> {
        &self.feedback
    }
}

fn summarize(snapshot: &SessionSnapshot, now_ms: u64) -> SessionSummary {
    let started_ms = snapshot.started_at_ms.unwrap_or(now_ms);
    let ended_ms = snapshot.stopped_at_ms.unwrap_or(now_ms);
    SessionSummary {
        id: Uuid::new_v4(),
        started_at: to_datetime(started_ms),
        ended_at: to_datetime(ended_ms),
        steps: snapshot.steps,
        distance_km: snapshot.distance_km,
        coins: snapshot.credited_units,
        final_tier: snapshot.tier,
    }
}

/// Messages accepted by a tracker thread
#[derive(Debug)]
enum Command {
    Start { now_ms: u64 },
    Event(TrackingEvent),
    Reset { now_ms: u64 },
    Stop {
        now_ms: u64,
        reply: Sender<Option<SessionSummary>>,
    },
    Shutdown,
}

/// Handle to a tracker running on its own thread
pub struct TrackerHandle<L: ProfileLedger, D: FeedbackDevice> {
    commands: Sender<Command>,
    outputs: Receiver<SessionOutput>,
    worker: JoinHandle<Tracker<L, D>>,
}

fn disconnected() -> Error {
    Error::Tracker("tracker thread has exited".into())
}

impl<L, D> TrackerHandle<L, D>
where
    L: ProfileLedger + Send + 'static,
    D: FeedbackDevice + Send + 'static,
{
    /// A producer endpoint; events are processed in send order across clones
    pub fn sender(&self) -> TrackerSender {
        TrackerSender {
            commands: self.commands.clone(),
        }
    }

    pub fn start(&self, now_ms: u64) -> Result<()> {
        self.commands
            .send(Command::Start { now_ms })
            .map_err(|_| disconnected())
    }

    pub fn send(&self, event: TrackingEvent) -> Result<()> {
        self.sender().send(event)
    }

    pub fn reset(&self, now_ms: u64) -> Result<()> {
        self.commands
            .send(Command::Reset { now_ms })
            .map_err(|_| disconnected())
    }

    /// Stop after every event already queued; later events are ignored
    pub fn stop(&self, now_ms: u64) -> Result<Option<SessionSummary>> {
        let (reply, response) = channel();
        self.commands
            .send(Command::Stop { now_ms, reply })
            .map_err(|_| disconnected())?;
        response.recv().map_err(|_| disconnected())
    }

    /// Outputs emitted so far, in processing order
    pub fn outputs(&self) -> &Receiver<SessionOutput> {
        &self.outputs
    }

    /// Shut the worker down and take the tracker back
    pub fn join(self) -> Result<Tracker<L, D>> {
        // The worker may already be gone; join reports that
        let _ = self.commands.send(Command::Shutdown);
        self.worker
            .join()
            .map_err(|_| Error::Tracker("tracker thread panicked".into()))
    }
}

/// Cloneable producer endpoint for motion or location sources
#[derive(Clone, Debug)]
pub struct TrackerSender {
    commands: Sender<Command>,
}

impl TrackerSender {
    pub fn send(&self, event: TrackingEvent) -> Result<()> {
        self.commands
            .send(Command::Event(event))
            .map_err(|_| disconnected())
    }
}

/// Run `tracker` on a dedicated thread
pub fn spawn_tracker<L, D>(tracker: Tracker<L, D>) -> Result<TrackerHandle<L, D>>
where
    L: ProfileLedger + Send + 'static,
    D: FeedbackDevice + Send + 'static,
{
    let (commands, inbox) = channel::<Command>();
    let (emit, outputs) = channel::<SessionOutput>();

    let worker = std::thread::Builder::new()
        .name("walk-tracker".into())
        .spawn(move || run(tracker, inbox, emit))?;

    Ok(TrackerHandle {
        commands,
        outputs,
        worker,
    })
}

fn run<L: ProfileLedger, D: FeedbackDevice>(
    mut tracker: Tracker<L, D>,
    inbox: Receiver<Command>,
    emit: Sender<SessionOutput>,
) -> Tracker<L, D> {
    while let Ok(command) = inbox.recv() {
        match command {
            Command::Start { now_ms } => tracker.start(now_ms),
            Command::Event(event) => match tracker.handle(&event) {
                Ok(outputs) => {
                    for output in outputs {
                        // Nobody listening is fine
                        let _ = emit.send(output);
                    }
                }
                Err(e) => tracing::error!("Tracker input failed: {}", e),
            },
            Command::Reset { now_ms } => tracker.reset(now_ms),
            Command::Stop { now_ms, reply } => {
                let _ = reply.send(tracker.stop(now_ms));
            }
            Command::Shutdown => break,
        }
    }
    tracing::debug!("Tracker thread exiting");
    tracker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::EARTH_RADIUS_KM;
    use crate::feedback::RecordingDevice;
    use crate::ledger::MemoryLedger;
    use crate::{ConfidenceTier, GeoFix, Profile, StepSource};

    fn fix_at(metres_north: f64, t: u64) -> TrackingEvent {
        let deg_per_m = 180.0 / (std::f64::consts::PI * EARTH_RADIUS_KM * 1000.0);
        TrackingEvent::Fix(GeoFix::new(45.0 + metres_north * deg_per_m, 16.0, t))
    }

    fn tracker(profile: Profile) -> Tracker<MemoryLedger, RecordingDevice> {
        Tracker::new(
            Config::default(),
            StepSettings::default(),
            MemoryLedger::new(profile),
            RecordingDevice::default(),
        )
    }

    #[test]
    fn test_credits_reach_ledger() {
        crate::logging::init_test();
        let mut tracker = tracker(Profile::default());
        tracker.start(0);
        tracker
            .handle(&TrackingEvent::MotionUnavailable { timestamp_ms: 0 })
            .unwrap();
        for i in 0..=6 {
            tracker.handle(&fix_at(i as f64 * 50.0, 1000 * i)).unwrap();
        }

        // 300 m walked
        let profile = tracker.ledger().profile();
        assert_eq!(profile.total_coins, 30);
        assert!((profile.total_distance_km - 0.3).abs() < 1e-9);
        assert_eq!(tracker.ledger().transactions().len(), 3);
    }

    #[test]
    fn test_feedback_lifecycle_and_burst_cap() {
        let mut tracker = tracker(Profile::default());
        tracker.start(0);
        assert!(tracker.feedback().is_active());

        tracker
            .handle(&TrackingEvent::MotionDenied { timestamp_ms: 0 })
            .unwrap();
        tracker.handle(&fix_at(0.0, 1000)).unwrap();
        let outputs = tracker.handle(&fix_at(50.0, 2000)).unwrap();
        let estimated: u64 = outputs
            .iter()
            .filter_map(|o| match o {
                SessionOutput::Steps {
                    source: StepSource::DistanceEstimate,
                    count,
                    ..
                } => Some(*count),
                _ => None,
            })
            .sum();
        // 50 m / 0.762 m stride
        assert_eq!(estimated, 65);
        assert_eq!(tracker.feedback().device().vibrations, 5);

        let summary = tracker.stop(3000).unwrap();
        assert!(!tracker.feedback().is_active());
        assert_eq!(tracker.feedback().device().released, 1);
        assert_eq!(summary.steps, 65);
        assert_eq!(summary.final_tier, ConfidenceTier::Medium);
    }

    #[test]
    fn test_stop_when_idle_is_none() {
        let mut tracker = tracker(Profile::default());
        assert!(tracker.stop(10).is_none());
    }

    #[test]
    fn test_threaded_tracker_orders_inputs() {
        let tracker = tracker(Profile {
            referral_count: 1,
            ..Profile::default()
        });
        let handle = spawn_tracker(tracker).unwrap();
        handle.start(0).unwrap();

        let location = handle.sender();
        let producer = std::thread::spawn(move || {
            location
                .send(TrackingEvent::MotionUnavailable { timestamp_ms: 0 })
                .unwrap();
            for i in 0..=4 {
                location.send(fix_at(i as f64 * 50.0, 1000 * i)).unwrap();
            }
        });
        producer.join().unwrap();

        let summary = handle.stop(6000).unwrap().unwrap();
        assert_eq!(summary.coins, 40);

        // Ignored after stop
        handle.send(fix_at(400.0, 7000)).unwrap();

        let credits = handle
            .outputs()
            .try_iter()
            .filter(|o| matches!(o, SessionOutput::Credit(_)))
            .count();
        assert_eq!(credits, 2);

        let tracker = handle.join().unwrap();
        assert_eq!(tracker.ledger().profile().total_coins, 40);
        assert_eq!(tracker.snapshot().steps, summary.steps);
    }
}
