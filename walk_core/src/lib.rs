#![forbid(unsafe_code)]

//! Core domain model and tracking pipeline for WalkCoin.
//!
//! This crate provides:
//! - Domain types (sensor samples, fixes, tiers, credits, sessions)
//! - Step detection and distance-based step estimation
//! - GPS distance accumulation and reward crediting
//! - Session controller and threaded tracker shell
//! - Persistence (settings, profile ledger, session journal, CSV rollup)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod detector;
pub mod distance;
pub mod arbiter;
pub mod rewards;
pub mod session;
pub mod tracker;
pub mod feedback;
pub mod settings;
pub mod state;
pub mod ledger;
pub mod journal;
pub mod rollup;
pub mod history;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use session::SessionController;
pub use tracker::{spawn_tracker, Tracker, TrackerHandle};
pub use feedback::{FeedbackDevice, StepFeedback};
pub use ledger::{FileLedger, MemoryLedger, ProfileLedger};
pub use journal::{JsonlSink, SessionSink};
pub use history::daily_stats;
