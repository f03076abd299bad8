//! Reading capability and query result types

/// Timestamp stored in slots that were never written
pub const UNWRITTEN_TIMESTAMP: f64 = -99.0;

/// Range queries starting at or below this time start from the first available reading
pub const FIRST_AVAILABLE: f64 = -0.1;

/// A timestamped unit of data stored in one ring slot.
///
/// `Default` must produce an unwritten slot, i.e. one whose timestamp is
/// negative (conventionally [`UNWRITTEN_TIMESTAMP`]).
pub trait Reading: Clone + Send + Sync + Default {
    /// Date of the physical event, in seconds
    fn timestamp(&self) -> f64;

    /// Date at which the reading became available, in seconds
    fn arrival(&self) -> f64;

    /// Whether the slot holds real data
    fn is_written(&self) -> bool {
        self.timestamp() >= 0.0
    }
}

/// Timing information about one stored reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawInfo {
    /// Slot index in the ring
    pub id: usize,
    /// Reading timestamp
    pub timestamp: f64,
    /// Reading arrival time
    pub arrival: f64,
}

impl RawInfo {
    pub fn new(id: usize, timestamp: f64, arrival: f64) -> Self {
        Self { id, timestamp, arrival }
    }
}

/// Unread readings plus a prediction of the next one
#[derive(Debug, Clone, Default)]
pub struct RawInfos {
    /// Unread readings, oldest first
    pub available: Vec<RawInfo>,
    /// Expected date and arrival of the next reading (id is meaningless)
    pub next: RawInfo,
}

/// Whether a stream can currently deliver data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// At least one unread reading
    Available,
    /// Empty, acquisition still live: poll again later
    NoDataYet,
    /// Empty and acquisition has terminated: stop consuming
    EndOfStream,
}

/// Outcome of a consuming query.
///
/// The two empty outcomes are routine and are not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Data(T),
    NoDataYet,
    EndOfStream,
}

impl<T> Fetch<T> {
    pub fn data(self) -> Option<T> {
        match self {
            Fetch::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Fetch::EndOfStream)
    }

    pub fn state(&self) -> StreamState {
        match self {
            Fetch::Data(_) => StreamState::Available,
            Fetch::NoDataYet => StreamState::NoDataYet,
            Fetch::EndOfStream => StreamState::EndOfStream,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Data(data) => Fetch::Data(f(data)),
            Fetch::NoDataYet => Fetch::NoDataYet,
            Fetch::EndOfStream => Fetch::EndOfStream,
        }
    }
}
