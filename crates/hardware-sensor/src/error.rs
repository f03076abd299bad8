//! Sensor Error Types

use ring_buffer::RingError;
use thiserror::Error;

use crate::quantity::Quantity;

/// Errors raised while configuring or running a sensor
#[derive(Debug, Error)]
pub enum SensorError {
    /// Ring buffer failure (overflow is fatal for the run)
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("Sensor '{0}' already started")]
    AlreadyStarted(String),

    #[error("Sensor '{0}' not started")]
    NotStarted(String),

    /// A quantity was added twice to the same layout
    #[error("Quantity {0:?} declared twice")]
    DuplicateQuantity(Quantity),

    /// Value count does not match the declared quantities
    #[error("Reading layout mismatch: expected {expected} values, got {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed line in a replay log
    #[error("Replay log error at line {line}: {reason}")]
    ReplayLog { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Acquisition thread for '{0}' panicked")]
    AcquisitionPanicked(String),
}

impl SensorError {
    /// Whether the run must be aborted
    pub fn is_fatal(&self) -> bool {
        match self {
            SensorError::Ring(err) => err.is_fatal(),
            SensorError::AcquisitionPanicked(_) => true,
            _ => false,
        }
    }
}
