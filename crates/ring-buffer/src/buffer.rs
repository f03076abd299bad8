//! Ring Buffer Core
//!
//! `SensorRing` owns the slots and the cursor state of one sensor. The single
//! writer role commits readings with [`SensorRing::push`] (online, fail-fast)
//! or [`SensorRing::push_blocking`] (offline replay, waits for the consumer);
//! the consumer role moves the read cursor through the query protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::cursor::{CircularIndex, Cursors};
use crate::error::{OverflowCause, RingError};
use crate::reading::{Fetch, Reading, UNWRITTEN_TIMESTAMP};
use crate::signal::{DataSignal, ProgressSignal};

/// Longest uninterrupted wait of a blocked offline writer before it re-checks the stop flag
const OFFLINE_WAIT: Duration = Duration::from_millis(50);

/// Best-effort timing estimates of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingInfo {
    /// Expected interval between two readings (s)
    pub data_period: f64,
    /// Latency between the physical event and data availability (s)
    pub arrival_delay: f64,
}

/// Occupancy of the unreleased region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    PartiallyFilled,
    Full,
}

/// State guarded by the ring mutex
#[derive(Debug)]
pub(crate) struct RingState {
    pub(crate) cursors: Cursors,
    pub(crate) timing: TimingInfo,
}

/// Fixed-capacity ring of readings shared by one writer and one consumer
pub struct SensorRing<T: Reading> {
    name: String,
    slots: Box<[RwLock<T>]>,
    state: Mutex<RingState>,
    /// Signalled whenever a release frees slots
    freed: Condvar,
    data_signal: DataSignal,
    progress: ProgressSignal,
    /// Liveness hint for the acquisition thread
    stopping: AtomicBool,
    /// Acquisition has permanently terminated
    no_more_data: AtomicBool,
}

impl<T: Reading> SensorRing<T> {
    /// Create a ring of `capacity` unwritten slots with its own data signal
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_signal(name, capacity, DataSignal::new())
    }

    /// Create a ring that raises a shared data signal on every write
    pub fn with_signal(name: impl Into<String>, capacity: usize, data_signal: DataSignal) -> Self {
        let name = name.into();
        let capacity = CircularIndex::new(capacity).capacity();
        info!("Creating sensor ring '{}' with {} slots", name, capacity);

        Self {
            name,
            slots: (0..capacity).map(|_| RwLock::new(T::default())).collect(),
            state: Mutex::new(RingState {
                cursors: Cursors::new(capacity),
                timing: TimingInfo::default(),
            }),
            freed: Condvar::new(),
            data_signal,
            progress: ProgressSignal::new(),
            stopping: AtomicBool::new(false),
            no_more_data: AtomicBool::new(false),
        }
    }

    /// Replace every slot with a fresh unwritten value and reset the cursors.
    ///
    /// Only possible during configuration, before the ring is shared.
    pub fn reset_slots(&mut self, mut make: impl FnMut() -> T) {
        let capacity = self.slots.len();
        self.slots = (0..capacity).map(|_| RwLock::new(make())).collect();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cursors = Cursors::new(capacity);
    }

    /// Sensor name, used in logs and metrics labels
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Signal raised on every committed reading and at end of stream
    pub fn data_signal(&self) -> &DataSignal {
        &self.data_signal
    }

    /// Consumption progress, advanced by every delivery to the primary consumer
    pub fn progress(&self) -> u64 {
        self.progress.value()
    }

    /// Receiver woken each time the consumption progress advances
    pub fn subscribe_progress(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn slot(&self, id: usize) -> RwLockReadGuard<'_, T> {
        self.slots[id].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_mut(&self, id: usize) -> RwLockWriteGuard<'_, T> {
        self.slots[id].write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn timestamp_at(&self, id: usize) -> f64 {
        self.slot(id).timestamp()
    }

    pub(crate) fn check_id(&self, id: usize) -> Result<(), RingError> {
        if id < self.capacity() {
            Ok(())
        } else {
            Err(RingError::SlotOutOfRange {
                id,
                capacity: self.capacity(),
            })
        }
    }

    pub(crate) fn notify_freed(&self) {
        self.freed.notify_all();
    }

    pub(crate) fn advance_progress(&self) -> u64 {
        self.progress.advance()
    }

    pub(crate) fn overflow(&self, cause: OverflowCause) -> RingError {
        error!("Sensor '{}' buffer overflow: {}", self.name, cause);
        metrics::counter!("sensor_ring_overflows_total", "sensor" => self.name.clone()).increment(1);
        RingError::BufferOverflow {
            sensor: self.name.clone(),
            cause,
        }
    }

    /// Snapshot of the cursor state
    pub fn cursors(&self) -> Cursors {
        self.lock().cursors.clone()
    }

    /// Whether every slot is unreleased, so the next write would overflow
    pub fn is_full(&self) -> bool {
        self.lock().cursors.is_full()
    }

    /// Whether no unread reading is available
    pub fn is_empty(&self) -> bool {
        self.lock().cursors.is_empty()
    }

    /// Readings written and not yet delivered or released
    pub fn unread_count(&self) -> usize {
        self.lock().cursors.unread_count()
    }

    /// Occupancy of the unreleased region, held slot included
    pub fn occupancy(&self) -> Occupancy {
        let state = self.lock();
        match state.cursors.occupied() {
            0 => Occupancy::Empty,
            n if n == self.capacity() => Occupancy::Full,
            _ => Occupancy::PartiallyFilled,
        }
    }

    /// Next slot to be written; fails when every slot is unreleased
    pub fn write_pos(&self) -> Result<usize, RingError> {
        let state = self.lock();
        if state.cursors.is_full() {
            return Err(self.overflow(OverflowCause::Full {
                capacity: self.capacity(),
            }));
        }
        Ok(state.cursors.write_pos())
    }

    /// Commit a reading, failing with `BufferOverflow` when the ring is full
    pub fn push(&self, reading: T) -> Result<usize, RingError> {
        let mut state = self.lock();
        if state.cursors.is_full() {
            return Err(self.overflow(OverflowCause::Full {
                capacity: self.capacity(),
            }));
        }
        let id = self.commit(&mut state, reading)?;
        drop(state);
        self.data_signal.notify();
        Ok(id)
    }

    /// Commit a reading, waiting for the consumer to free a slot when full.
    ///
    /// Returns `Stopped` if a stop is requested while waiting.
    pub fn push_blocking(&self, reading: T) -> Result<usize, RingError> {
        let mut state = self.lock();
        while state.cursors.is_full() {
            if self.is_stopping() {
                return Err(RingError::Stopped);
            }
            let (guard, _) = self
                .freed
                .wait_timeout(state, OFFLINE_WAIT)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        let id = self.commit(&mut state, reading)?;
        drop(state);
        self.data_signal.notify();
        Ok(id)
    }

    /// Store `reading` at the write position; the caller holds the lock and checked for space
    fn commit(&self, state: &mut RingState, reading: T) -> Result<usize, RingError> {
        let timestamp = reading.timestamp();
        if !reading.is_written() {
            return Err(RingError::Unwritten(timestamp));
        }
        let newest = self.timestamp_at(state.cursors.index().prev(state.cursors.write_pos()));
        if newest >= 0.0 && timestamp <= newest {
            return Err(RingError::OutOfOrder {
                previous: newest,
                timestamp,
            });
        }

        *self.slot_mut(state.cursors.write_pos()) = reading;
        let id = state.cursors.advance_write().ok_or_else(|| {
            self.overflow(OverflowCause::Full {
                capacity: self.capacity(),
            })
        })?;
        debug!("Sensor '{}' wrote slot {} (t={:.6})", self.name, id, timestamp);
        Ok(id)
    }

    /// Release every slot strictly before `id`, keeping `id` reserved
    pub fn release_until(&self, id: usize) -> Result<(), RingError> {
        self.check_id(id)?;
        let released = self.lock().cursors.release_until(id);
        if released {
            self.notify_freed();
        }
        Ok(())
    }

    /// Release every slot up to and including `id`
    pub fn release(&self, id: usize) -> Result<(), RingError> {
        self.check_id(id)?;
        let released = self.lock().cursors.release(id);
        if released {
            self.notify_freed();
        }
        Ok(())
    }

    /// Release the reading currently held by the consumer, if any
    pub fn release_held(&self) {
        let mut state = self.lock();
        if state.cursors.is_held() {
            let id = state.cursors.read_pos();
            state.cursors.release(id);
            drop(state);
            self.notify_freed();
        }
    }

    /// Timestamp of the newest written reading, or [`UNWRITTEN_TIMESTAMP`]
    pub fn last_timestamp(&self) -> f64 {
        let state = self.lock();
        self.last_timestamp_locked(&state)
    }

    pub(crate) fn last_timestamp_locked(&self, state: &RingState) -> f64 {
        let newest = self.timestamp_at(state.cursors.index().prev(state.cursors.write_pos()));
        if newest >= 0.0 {
            newest
        } else {
            UNWRITTEN_TIMESTAMP
        }
    }

    pub fn raw_timestamp(&self, id: usize) -> Result<f64, RingError> {
        self.check_id(id)?;
        Ok(self.timestamp_at(id))
    }

    /// Copy slot `id` without touching the cursors (display, export)
    pub fn observe_raw(&self, id: usize) -> Result<T, RingError> {
        self.check_id(id)?;
        Ok(self.slot(id).clone())
    }

    /// Copy of the reading most recently delivered to the consumer
    pub fn last_processed_raw(&self) -> Option<T> {
        let id = self.lock().cursors.last_sent()?;
        Some(self.slot(id).clone())
    }

    /// Current timing estimates
    pub fn timing(&self) -> TimingInfo {
        self.lock().timing
    }

    /// Refine the timing estimates; `arrival_delay` should start overestimated
    pub fn set_timing(&self, data_period: f64, arrival_delay: f64) {
        self.lock().timing = TimingInfo {
            data_period,
            arrival_delay,
        };
    }

    /// Ask the acquisition thread to exit its loop
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Relaxed);
        self.notify_freed();
    }

    /// Whether a stop was requested
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Relaxed)
    }

    /// Mark the stream as permanently terminated
    pub fn signal_end_of_stream(&self) {
        let state = self.lock();
        self.no_more_data.store(true, Ordering::Relaxed);
        drop(state);
        info!("Sensor '{}' reached end of stream", self.name);
        self.data_signal.notify();
    }

    /// Whether acquisition has permanently terminated
    pub fn is_end_of_stream(&self) -> bool {
        self.no_more_data.load(Ordering::Relaxed)
    }

    /// Empty outcome for a query made while holding the lock
    pub(crate) fn empty_outcome<U>(&self, _state: &RingState) -> Fetch<U> {
        if self.is_end_of_stream() {
            Fetch::EndOfStream
        } else {
            Fetch::NoDataYet
        }
    }
}

impl<T: Reading> std::fmt::Debug for SensorRing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRing")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("cursors", &self.cursors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{filled_ring, Sample};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_and_occupancy() {
        let ring = SensorRing::<Sample>::new("imu", 4);
        assert!(ring.is_empty());
        assert_eq!(ring.occupancy(), Occupancy::Empty);

        ring.push(Sample::at(1.0)).unwrap();
        assert_eq!(ring.occupancy(), Occupancy::PartiallyFilled);
        assert_eq!(ring.unread_count(), 1);

        for t in 2..=4 {
            ring.push(Sample::at(t as f64)).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.occupancy(), Occupancy::Full);
        assert_eq!(ring.cursors().write_pos(), ring.cursors().read_pos());
    }

    #[test]
    fn test_overflow_on_extra_write() {
        let ring = filled_ring(3, 3);
        let err = ring.push(Sample::at(4.0)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            RingError::BufferOverflow {
                cause: OverflowCause::Full { capacity: 3 },
                ..
            }
        ));
        assert!(ring.write_pos().is_err());
    }

    #[test]
    fn test_release_makes_room() {
        let ring = filled_ring(3, 3);
        ring.release(0).unwrap();
        assert!(!ring.is_full());
        assert_eq!(ring.write_pos().unwrap(), 0);
        assert_eq!(ring.push(Sample::at(4.0)).unwrap(), 0);
        assert_eq!(ring.last_timestamp(), 4.0);
    }

    #[test]
    fn test_release_twice_is_noop() {
        let ring = filled_ring(5, 4);
        ring.release(1).unwrap();
        let after_first = ring.cursors();
        ring.release(1).unwrap();
        assert_eq!(ring.cursors(), after_first);
        assert_eq!(ring.unread_count(), 2);
    }

    #[test]
    fn test_release_held() {
        let ring = filled_ring(4, 2);
        ring.release_until(1).unwrap();
        assert_eq!(ring.cursors().occupied(), 1);
        ring.release_held();
        assert_eq!(ring.occupancy(), Occupancy::Empty);
    }

    #[test]
    fn test_rejects_out_of_order_and_unwritten() {
        let ring = filled_ring(4, 2);
        assert!(matches!(
            ring.push(Sample::at(2.0)),
            Err(RingError::OutOfOrder { .. })
        ));
        assert!(matches!(
            ring.push(Sample::default()),
            Err(RingError::Unwritten(_))
        ));
        assert_eq!(ring.unread_count(), 2);
    }

    #[test]
    fn test_slot_out_of_range() {
        let ring = filled_ring(4, 1);
        assert!(matches!(
            ring.observe_raw(4),
            Err(RingError::SlotOutOfRange { id: 4, capacity: 4 })
        ));
        assert!(ring.release(9).is_err());
    }

    #[test]
    fn test_observe_does_not_move_cursors() {
        let ring = filled_ring(4, 3);
        let before = ring.cursors();
        assert_eq!(ring.observe_raw(1).unwrap(), Sample::at(2.0));
        assert_eq!(ring.raw_timestamp(2).unwrap(), 3.0);
        assert_eq!(ring.cursors(), before);
    }

    #[test]
    fn test_last_timestamp_unwritten() {
        let ring = SensorRing::<Sample>::new("gps", 4);
        assert_eq!(ring.last_timestamp(), UNWRITTEN_TIMESTAMP);
        assert!(ring.last_processed_raw().is_none());
    }

    #[test]
    fn test_reset_slots() {
        let mut ring = filled_ring(4, 2);
        ring.reset_slots(Sample::default);
        assert!(ring.is_empty());
        assert_eq!(ring.last_timestamp(), UNWRITTEN_TIMESTAMP);
    }

    #[test]
    fn test_data_signal_raised_on_push() {
        let signal = DataSignal::new();
        let ring = SensorRing::<Sample>::with_signal("cam", 4, signal.clone());
        ring.push(Sample::at(1.0)).unwrap();
        ring.push(Sample::at(2.0)).unwrap();
        assert_eq!(signal.count(), 2);
    }

    #[test]
    fn test_timing_infos() {
        let ring = SensorRing::<Sample>::new("odo", 4);
        ring.set_timing(0.01, 0.002);
        assert_eq!(
            ring.timing(),
            TimingInfo {
                data_period: 0.01,
                arrival_delay: 0.002
            }
        );
    }

    #[test]
    fn test_blocking_push_waits_for_release() {
        let ring = Arc::new(filled_ring(2, 2));
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.push_blocking(Sample::at(3.0)))
        };

        thread::sleep(Duration::from_millis(20));
        assert!(ring.is_full());
        ring.release(0).unwrap();

        let id = writer.join().unwrap().unwrap();
        assert_eq!(id, 0);
        assert_eq!(ring.last_timestamp(), 3.0);
    }

    #[test]
    fn test_blocking_push_interrupted_by_stop() {
        let ring = Arc::new(filled_ring(2, 2));
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || ring.push_blocking(Sample::at(3.0)))
        };

        thread::sleep(Duration::from_millis(20));
        ring.request_stop();
        assert!(matches!(writer.join().unwrap(), Err(RingError::Stopped)));
    }
}
