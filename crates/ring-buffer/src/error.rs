//! Ring Buffer Error Types

use std::fmt;
use thiserror::Error;

/// Why a buffer overflow was raised
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverflowCause {
    /// A write found every slot still unreleased
    Full { capacity: usize },
    /// A range query needs readings older than the oldest one still stored
    DataOverwritten { requested: f64, oldest: f64 },
}

impl fmt::Display for OverflowCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowCause::Full { capacity } => {
                write!(f, "all {} slots are unreleased", capacity)
            }
            OverflowCause::DataOverwritten { requested, oldest } => write!(
                f,
                "reading at {:.6} requested but oldest stored is {:.6}, increase buffer size",
                requested, oldest
            ),
        }
    }
}

/// Errors raised by ring buffer operations
#[derive(Debug, Clone, Error)]
pub enum RingError {
    /// Capacity too small for the consumer lag (fatal for the run)
    #[error("Buffer overflow on sensor {sensor}: {cause}")]
    BufferOverflow { sensor: String, cause: OverflowCause },

    /// Readings must be written in strictly increasing timestamp order
    #[error("Out of order reading: timestamp {timestamp} is not after {previous}")]
    OutOfOrder { previous: f64, timestamp: f64 },

    /// Attempt to write a reading without a valid timestamp
    #[error("Reading has no valid timestamp ({0})")]
    Unwritten(f64),

    /// Slot index beyond capacity
    #[error("Slot {id} out of range for capacity {capacity}")]
    SlotOutOfRange { id: usize, capacity: usize },

    /// Slot is not part of the unreleased region
    #[error("Slot {0} has already been released")]
    SlotReleased(usize),

    /// Range query with t1 > t2
    #[error("Invalid time range [{t1}, {t2}]")]
    InvalidRange { t1: f64, t2: f64 },

    /// A blocking write was interrupted by a stop request
    #[error("Acquisition stopped while waiting for free space")]
    Stopped,
}

impl RingError {
    /// Whether the run must be aborted rather than retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, RingError::BufferOverflow { .. })
    }
}
