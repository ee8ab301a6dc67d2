//! Error types for the walk_core library.
//!
//! The live tracking pipeline never returns these: bad samples are dropped and
//! missing sensors degrade the confidence tier. Errors only come out of the
//! file-backed collaborators (settings, ledger, journal, rollup) and config.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for walk_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Step settings rejected at the write boundary
    #[error("Invalid step settings: {0}")]
    Settings(String),

    /// Profile ledger could not apply a credit
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Tracker worker is gone or refused a command
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
