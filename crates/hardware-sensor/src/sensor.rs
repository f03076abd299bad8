//! Sensor lifecycle

use std::sync::Arc;

use ring_buffer::{DataSignal, Reading, SensorRing};

use crate::config::SensorConfig;
use crate::error::SensorError;

/// Lifecycle of a sensor as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    /// Configured, acquisition thread not started
    NotStarted,
    /// Acquiring
    Running,
    /// Acquisition over, unread readings remain
    Draining,
    /// Acquisition over and everything consumed
    Stopped,
}

/// A sensor backed by a ring buffer and an acquisition thread.
///
/// The consumer reads data through [`HardwareSensor::ring`].
pub trait HardwareSensor {
    type Raw: Reading;

    fn ring(&self) -> &Arc<SensorRing<Self::Raw>>;

    /// Start the acquisition thread, once the sensor is configured
    fn start(&mut self) -> Result<(), SensorError>;

    /// Stop the acquisition thread and return the number of readings it wrote
    fn stop(&mut self) -> Result<u64, SensorError>;

    fn is_started(&self) -> bool;

    fn name(&self) -> &str {
        self.ring().name()
    }

    fn state(&self) -> SensorState {
        let ring = self.ring();
        if !self.is_started() {
            SensorState::NotStarted
        } else if !ring.is_stopping() && !ring.is_end_of_stream() {
            SensorState::Running
        } else if !ring.is_empty() {
            SensorState::Draining
        } else {
            SensorState::Stopped
        }
    }
}

/// Ring sized and timed from `config`, raising `signal` on every write
pub(crate) fn build_ring<T: Reading>(config: &SensorConfig, signal: DataSignal) -> SensorRing<T> {
    let ring = SensorRing::with_signal(config.name.clone(), config.buffer_size, signal);
    ring.set_timing(config.data_period, config.arrival_delay);
    ring
}
