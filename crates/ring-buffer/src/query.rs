//! Consumer Query Protocol
//!
//! Read operations used by the estimation thread. Position bookkeeping is done
//! under the ring mutex; readings are copied out after it is released.

use tracing::debug;

use crate::buffer::SensorRing;
use crate::error::{OverflowCause, RingError};
use crate::reading::{Fetch, RawInfo, RawInfos, Reading, StreamState, FIRST_AVAILABLE};

/// The newest unread reading together with the number of readings skipped to reach it
#[derive(Debug, Clone, PartialEq)]
pub struct LatestReading<T> {
    pub id: usize,
    pub reading: T,
    /// Readings written since the previous latest-only query and never delivered
    pub missed: usize,
}

/// Owned copy of a contiguous (possibly wrapped) run of slots, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct RawWindow<T> {
    ids: Vec<usize>,
    readings: Vec<T>,
}

impl<T: Reading> RawWindow<T> {
    /// Window returned before any reading has arrived
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            readings: Vec::new(),
        }
    }

    /// Number of readings, bracketing ones included
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when no data has arrived yet
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Slot indices, in the same order as the readings
    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    /// Copied readings, oldest first
    pub fn readings(&self) -> &[T] {
        &self.readings
    }

    /// `(slot id, reading)` pairs, oldest first
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.ids.iter().copied().zip(self.readings.iter())
    }

    /// Oldest reading, the one bracketing `t1` when it exists
    pub fn first(&self) -> Option<&T> {
        self.readings.first()
    }

    /// Newest reading, the one bracketing `t2` when it exists
    pub fn last(&self) -> Option<&T> {
        self.readings.last()
    }

    /// Timestamps of the readings, oldest first
    pub fn timestamps(&self) -> Vec<f64> {
        self.readings.iter().map(Reading::timestamp).collect()
    }

    /// Take the readings, dropping the slot ids
    pub fn into_readings(self) -> Vec<T> {
        self.readings
    }

    fn is_consistent(&self) -> bool {
        self.readings.iter().all(Reading::is_written)
            && self
                .readings
                .windows(2)
                .all(|pair| pair[0].timestamp() < pair[1].timestamp())
    }
}

impl<T: Reading> SensorRing<T> {
    /// Slot and timestamp of the oldest unread reading, without consuming it
    pub fn next_raw_info(&self) -> Fetch<RawInfo> {
        let state = self.lock();
        match state.cursors.first_unread() {
            Some(id) => {
                let slot = self.slot(id);
                Fetch::Data(RawInfo::new(id, slot.timestamp(), slot.arrival()))
            }
            None => self.empty_outcome(&state),
        }
    }

    /// Every unread reading in chronological order, plus the predicted next one
    pub fn unread_raw_infos(&self) -> (StreamState, RawInfos) {
        let state = self.lock();
        let mut infos = RawInfos::default();

        if let (Some(first), Some(last)) = (state.cursors.first_unread(), state.cursors.last_unread()) {
            let (head, tail) = state.cursors.index().span(first, last);
            debug!("Sensor '{}' unread slots {:?} {:?}", self.name(), head, tail);
            for id in head.chain(tail) {
                let slot = self.slot(id);
                infos.available.push(RawInfo::new(id, slot.timestamp(), slot.arrival()));
            }
        }

        let next_date = self.last_timestamp_locked(&state) + state.timing.data_period;
        infos.next = RawInfo::new(0, next_date, next_date + state.timing.arrival_delay);

        let stream = if infos.available.is_empty() {
            self.empty_outcome::<()>(&state).state()
        } else {
            StreamState::Available
        };
        (stream, infos)
    }

    /// Deliver slot `id`, releasing every slot before it and keeping `id` reserved
    pub fn get_raw(&self, id: usize) -> Result<T, RingError> {
        self.check_id(id)?;
        let mut state = self.lock();
        if !state.cursors.release_until(id) {
            return Err(RingError::SlotReleased(id));
        }
        state.cursors.set_last_sent(id);
        drop(state);
        self.notify_freed();

        let raw = self.slot(id).clone();
        let progress = self.advance_progress();
        debug!("Sensor '{}' delivered slot {} (progress {})", self.name(), id, progress);
        Ok(raw)
    }

    /// Deliver the newest unread reading, discarding the ones written before it.
    ///
    /// Readings already delivered through [`SensorRing::get_raw`] or released
    /// are neither delivered again nor counted as missed.
    pub fn get_last_unread_raw(&self) -> Fetch<LatestReading<T>> {
        let mut state = self.lock();
        let data_count = state.cursors.take_data_count();
        let pending = data_count.min(state.cursors.unread_count());
        if pending == 0 {
            return self.empty_outcome(&state);
        }

        let id = state.cursors.index().prev(state.cursors.write_pos());
        state.cursors.release_until(id);
        state.cursors.set_last_sent(id);
        drop(state);
        self.notify_freed();

        let reading = self.slot(id).clone();
        self.advance_progress();

        let missed = pending - 1;
        if missed > 0 {
            debug!("Sensor '{}' skipped {} readings", self.name(), missed);
            metrics::counter!("sensor_ring_missed_samples_total", "sensor" => self.name().to_string())
                .increment(missed as u64);
        }
        Fetch::Data(LatestReading { id, reading, missed })
    }

    /// Readings covering `[t1, t2]`, with one extra reading before `t1` and
    /// one after `t2` for interpolation when they exist.
    ///
    /// `t1 <= FIRST_AVAILABLE` starts at the oldest stored reading. An empty
    /// window means no data has arrived yet. When `release` is set, slots
    /// before the returned window are released.
    pub fn get_raws(&self, t1: f64, t2: f64, release: bool) -> Result<RawWindow<T>, RingError> {
        if !(t1 <= t2) {
            return Err(RingError::InvalidRange { t1, t2 });
        }

        let mut state = self.lock();
        let index = state.cursors.index();
        let write = state.cursors.write_pos();
        // logical position 0 is the oldest slot, capacity - 1 the newest
        let timestamp = |logical: usize| self.timestamp_at(index.wrap(write + logical));
        let newest = index.capacity() - 1;

        let mut left = 0;
        let mut right = newest;
        while left != right {
            let mid = (left + right) / 2;
            if timestamp(mid) >= t1 {
                right = mid;
            } else {
                left = mid + 1;
            }
        }
        let first = index.wrap(write + left);
        let first_timestamp = self.timestamp_at(first);
        let no_larger = first_timestamp < t1;
        let no_smaller = left == 0;

        let mut before = if t1 <= FIRST_AVAILABLE || no_smaller {
            first
        } else {
            index.prev(first)
        };
        if self.timestamp_at(before) < 0.0 {
            if no_larger {
                return Ok(RawWindow::empty());
            }
            // acquisition started after t1
            before = first;
        }
        if no_smaller && !no_larger && t1 > 0.0 {
            return Err(self.overflow(OverflowCause::DataOverwritten {
                requested: t1,
                oldest: first_timestamp,
            }));
        }

        let last = if no_larger {
            first
        } else {
            let mut right = newest;
            while left != right {
                let mid = (left + right) / 2;
                if timestamp(mid) >= t2 {
                    right = mid;
                } else {
                    left = mid + 1;
                }
            }
            index.wrap(write + left)
        };

        let released = release && state.cursors.release_until(before);
        drop(state);
        if released {
            self.notify_freed();
        }

        let (head, tail) = index.span(before, last);
        let ids: Vec<usize> = head.chain(tail).collect();
        let readings = ids.iter().map(|&id| self.slot(id).clone()).collect();
        let window = self.verify_window(RawWindow { ids, readings }, t1, first_timestamp)?;
        debug!(
            "Sensor '{}' window [{:.6}, {:.6}] -> {} readings",
            self.name(),
            t1,
            t2,
            window.len()
        );
        Ok(window)
    }

    /// Fail with `DataOverwritten` if the writer overwrote part of a copied window
    fn verify_window(
        &self,
        window: RawWindow<T>,
        requested: f64,
        oldest: f64,
    ) -> Result<RawWindow<T>, RingError> {
        if window.is_consistent() {
            return Ok(window);
        }
        let oldest = window.first().map_or(oldest, Reading::timestamp);
        Err(self.overflow(OverflowCause::DataOverwritten { requested, oldest }))
    }
}
