//! Sensor Ring Buffer
//!
//! Fixed-capacity circular storage that decouples sensor acquisition threads
//! from the estimation thread. Readings are kept in timestamp order and can be
//! consumed one at a time, as "latest only", or as a timestamp window with one
//! bracketing reading on each side for interpolation.

mod buffer;
mod cursor;
mod error;
mod query;
mod reading;
mod signal;

pub use buffer::{Occupancy, SensorRing, TimingInfo};
pub use cursor::{CircularIndex, Cursors};
pub use error::{OverflowCause, RingError};
pub use query::{LatestReading, RawWindow};
pub use reading::{Fetch, RawInfo, RawInfos, Reading, StreamState, FIRST_AVAILABLE, UNWRITTEN_TIMESTAMP};
pub use signal::{DataSignal, ProgressSignal};

/// Default ring capacity (10 s of data at 100 Hz)
pub const DEFAULT_CAPACITY: usize = 1000;

#[cfg(test)]
mod test_support;
