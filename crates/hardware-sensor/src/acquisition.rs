//! Acquisition Thread
//!
//! One thread per sensor pulls readings from a [`ReadingSource`] and commits
//! them to the sensor ring, until the source is exhausted, a stop is
//! requested or the ring overflows. End of stream is signalled on every exit
//! path so consumers never wait on a dead sensor.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ring_buffer::{Reading, RingError, SensorRing};
use tracing::{debug, error, info, warn};

use crate::config::OverflowPolicy;
use crate::error::SensorError;

/// Source errors tolerated in a row before the acquisition gives up
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Producer of readings for one sensor
pub trait ReadingSource<T>: Send + 'static {
    /// Next reading, `None` once the source is exhausted
    fn next_reading(&mut self) -> Result<Option<T>, SensorError>;
}

impl<T, F> ReadingSource<T> for F
where
    F: FnMut() -> Result<Option<T>, SensorError> + Send + 'static,
{
    fn next_reading(&mut self) -> Result<Option<T>, SensorError> {
        self()
    }
}

/// Handle on a running acquisition thread
pub struct Acquisition<T: Reading + 'static> {
    ring: Arc<SensorRing<T>>,
    handle: Option<JoinHandle<Result<u64, SensorError>>>,
}

impl<T: Reading + 'static> Acquisition<T> {
    /// Spawn the acquisition thread.
    ///
    /// `pacing` is the sleep between two readings, `None` to acquire as fast
    /// as the source delivers.
    pub fn spawn<S>(
        ring: Arc<SensorRing<T>>,
        source: S,
        policy: OverflowPolicy,
        pacing: Option<Duration>,
    ) -> Result<Self, SensorError>
    where
        S: ReadingSource<T>,
    {
        let thread_ring = ring.clone();
        let handle = thread::Builder::new()
            .name(format!("acq-{}", ring.name()))
            .spawn(move || run(&thread_ring, source, policy, pacing))?;

        info!("Acquisition started for sensor '{}' ({:?})", ring.name(), policy);
        Ok(Self {
            ring,
            handle: Some(handle),
        })
    }

    pub fn ring(&self) -> &Arc<SensorRing<T>> {
        &self.ring
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request a stop and wait for the thread; returns the number of readings written
    pub fn stop(mut self) -> Result<u64, SensorError> {
        self.ring.request_stop();
        self.join_inner()
    }

    /// Wait for the source to be exhausted; returns the number of readings written
    pub fn join(mut self) -> Result<u64, SensorError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<u64, SensorError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SensorError::AcquisitionPanicked(self.ring.name().to_string()))?,
            None => Ok(0),
        }
    }
}

impl<T: Reading + 'static> Drop for Acquisition<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.ring.request_stop();
            if let Err(e) = self.join_inner() {
                warn!("Acquisition for '{}' ended with error: {}", self.ring.name(), e);
            }
        }
    }
}

/// Signals end of stream when dropped, including on panic
struct EndOfStreamGuard<'a, T: Reading>(&'a SensorRing<T>);

impl<T: Reading> Drop for EndOfStreamGuard<'_, T> {
    fn drop(&mut self) {
        self.0.signal_end_of_stream();
    }
}

fn run<T, S>(
    ring: &SensorRing<T>,
    mut source: S,
    policy: OverflowPolicy,
    pacing: Option<Duration>,
) -> Result<u64, SensorError>
where
    T: Reading,
    S: ReadingSource<T>,
{
    let _eos = EndOfStreamGuard(ring);
    let mut written = 0u64;
    let mut consecutive_errors = 0u32;

    while !ring.is_stopping() {
        let reading = match source.next_reading() {
            Ok(Some(reading)) => {
                consecutive_errors = 0;
                reading
            }
            Ok(None) => {
                info!("Sensor '{}' source exhausted after {} readings", ring.name(), written);
                break;
            }
            Err(e) if e.is_fatal() => {
                error!("Sensor '{}' source failed: {}", ring.name(), e);
                return Err(e);
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "Sensor '{}' read error ({}/{}): {}",
                    ring.name(),
                    consecutive_errors,
                    MAX_CONSECUTIVE_ERRORS,
                    e
                );
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("Sensor '{}' giving up after repeated read errors", ring.name());
                    return Err(e);
                }
                continue;
            }
        };

        let pushed = match policy {
            OverflowPolicy::Fail => ring.push(reading),
            OverflowPolicy::Block => ring.push_blocking(reading),
        };
        match pushed {
            Ok(id) => {
                written += 1;
                debug!("Sensor '{}' acquired reading into slot {}", ring.name(), id);
            }
            Err(RingError::Stopped) => break,
            Err(e) if e.is_fatal() => {
                error!("Sensor '{}' acquisition aborted: {}", ring.name(), e);
                return Err(e.into());
            }
            Err(e) => {
                warn!("Sensor '{}' dropped reading: {}", ring.name(), e);
            }
        }

        if let Some(interval) = pacing {
            thread::sleep(interval);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proprio::RawVec;

    fn counting_source(count: usize) -> impl ReadingSource<RawVec> {
        let mut i = 0usize;
        move || {
            if i == count {
                return Ok(None);
            }
            i += 1;
            Ok(Some(RawVec {
                data: vec![i as f64, i as f64 * 2.0],
                arrival: i as f64,
            }))
        }
    }

    #[test]
    fn test_source_exhaustion_signals_end_of_stream() {
        let ring = Arc::new(SensorRing::new("test", 8));
        let acq = Acquisition::spawn(ring.clone(), counting_source(5), OverflowPolicy::Fail, None)
            .unwrap();
        assert_eq!(acq.join().unwrap(), 5);
        assert!(ring.is_end_of_stream());
        assert_eq!(ring.unread_count(), 5);
    }

    #[test]
    fn test_overflow_is_fatal_and_ends_stream() {
        let ring = Arc::new(SensorRing::new("test", 4));
        let acq = Acquisition::spawn(ring.clone(), counting_source(10), OverflowPolicy::Fail, None)
            .unwrap();
        let err = acq.join().unwrap_err();
        assert!(err.is_fatal());
        assert!(ring.is_end_of_stream());
    }

    #[test]
    fn test_blocking_policy_waits_for_consumer() {
        let ring = Arc::new(SensorRing::new("test", 4));
        let acq = Acquisition::spawn(ring.clone(), counting_source(20), OverflowPolicy::Block, None)
            .unwrap();

        let mut seen = Vec::new();
        loop {
            match ring.next_raw_info() {
                ring_buffer::Fetch::Data(info) => {
                    seen.push(info.timestamp);
                    ring.release(info.id).unwrap();
                }
                ring_buffer::Fetch::NoDataYet => thread::sleep(Duration::from_millis(1)),
                ring_buffer::Fetch::EndOfStream => break,
            }
        }
        assert_eq!(acq.join().unwrap(), 20);
        let expected: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_stop_interrupts_blocked_writer() {
        let ring = Arc::new(SensorRing::new("test", 2));
        let acq = Acquisition::spawn(ring.clone(), counting_source(100), OverflowPolicy::Block, None)
            .unwrap();
        while !ring.is_full() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(acq.stop().unwrap(), 2);
        assert!(ring.is_end_of_stream());
    }

    #[test]
    fn test_out_of_order_reading_is_dropped() {
        let mut timestamps = vec![1.0, 3.0, 2.0, 4.0].into_iter();
        let source = move || {
            Ok(timestamps.next().map(|t| RawVec {
                data: vec![t],
                arrival: t,
            }))
        };
        let ring = Arc::new(SensorRing::new("test", 8));
        let acq = Acquisition::spawn(ring.clone(), source, OverflowPolicy::Fail, None).unwrap();
        assert_eq!(acq.join().unwrap(), 3);
        assert_eq!(ring.last_timestamp(), 4.0);
    }

    #[test]
    fn test_repeated_source_errors_give_up() {
        let source = || -> Result<Option<RawVec>, SensorError> {
            Err(SensorError::InvalidConfig("device unplugged".into()))
        };
        let ring = Arc::new(SensorRing::new("test", 8));
        let acq = Acquisition::spawn(ring.clone(), source, OverflowPolicy::Fail, None).unwrap();
        assert!(matches!(acq.join(), Err(SensorError::InvalidConfig(_))));
        assert!(ring.is_end_of_stream());
    }
}
