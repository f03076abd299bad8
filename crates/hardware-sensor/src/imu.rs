//! Simulated Inertial Unit
//!
//! Generates accelerometer and gyroscope readings at the configured rate,
//! used for bench runs without the hardware attached.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use ring_buffer::{DataSignal, SensorRing};

use crate::acquisition::{Acquisition, ReadingSource};
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::proprio::{ProprioSensor, RawVec, ReadingLayout};
use crate::quantity::Quantity;
use crate::sensor::{build_ring, HardwareSensor};

const GRAVITY: f64 = 9.81;

/// Accelerometer noise variance (m/s^2)^2
const ACC_VARIANCE: f64 = 0.0004;
/// Gyroscope noise variance (rad/s)^2
const GYRO_VARIANCE: f64 = 0.00001;

pub struct SimulatedImu {
    config: SensorConfig,
    layout: ReadingLayout,
    ring: Arc<SensorRing<RawVec>>,
    acquisition: Option<Acquisition<RawVec>>,
    started: bool,
    sample_limit: Option<u64>,
    paced: bool,
}

impl SimulatedImu {
    pub fn new(config: SensorConfig) -> Result<Self, SensorError> {
        config.validate()?;
        let layout =
            ReadingLayout::with_quantities(config.covariance, &[Quantity::Acc, Quantity::AngVel])?;
        let mut ring = build_ring(&config, DataSignal::new());
        layout.init_data(&mut ring);

        Ok(Self {
            config,
            layout,
            ring: Arc::new(ring),
            acquisition: None,
            started: false,
            sample_limit: None,
            paced: true,
        })
    }

    /// Raise `signal` on every reading, to share one wake-up with other sensors
    pub fn with_data_signal(mut self, signal: DataSignal) -> Self {
        let mut ring = build_ring(&self.config, signal);
        self.layout.init_data(&mut ring);
        self.ring = Arc::new(ring);
        self
    }

    /// Stop producing after `count` readings
    pub fn with_sample_limit(mut self, count: u64) -> Self {
        self.sample_limit = Some(count);
        self
    }

    /// Produce readings as fast as the ring accepts them
    pub fn without_pacing(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }
}

impl HardwareSensor for SimulatedImu {
    type Raw = RawVec;

    fn ring(&self) -> &Arc<SensorRing<RawVec>> {
        &self.ring
    }

    fn start(&mut self) -> Result<(), SensorError> {
        if self.started {
            return Err(SensorError::AlreadyStarted(self.config.name.clone()));
        }
        let source = ImuSource {
            layout: self.layout.clone(),
            period: self.config.data_period,
            correction: self.config.timestamps_correction,
            delay: self.config.arrival_delay,
            produced: 0,
            limit: self.sample_limit,
        };
        let pacing = self
            .paced
            .then(|| Duration::from_secs_f64(self.config.data_period));
        self.acquisition = Some(Acquisition::spawn(
            self.ring.clone(),
            source,
            self.config.overflow_policy,
            pacing,
        )?);
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<u64, SensorError> {
        if !self.started {
            return Err(SensorError::NotStarted(self.config.name.clone()));
        }
        match self.acquisition.take() {
            Some(acquisition) => acquisition.stop(),
            None => Ok(0),
        }
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

impl ProprioSensor for SimulatedImu {
    fn layout(&self) -> &ReadingLayout {
        &self.layout
    }

    fn instant_values(&self) -> Vec<usize> {
        [Quantity::Acc, Quantity::AngVel]
            .iter()
            .filter_map(|&q| self.layout.columns(q))
            .flatten()
            .collect()
    }

    fn increment_values(&self) -> Vec<usize> {
        Vec::new()
    }
}

struct ImuSource {
    layout: ReadingLayout,
    period: f64,
    correction: f64,
    delay: f64,
    produced: u64,
    limit: Option<u64>,
}

impl ReadingSource<RawVec> for ImuSource {
    fn next_reading(&mut self) -> Result<Option<RawVec>, SensorError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        self.produced += 1;

        let t = self.produced as f64 * self.period;
        // slow sway around the vertical
        let phase = TAU * 0.5 * t;
        let values = [
            0.2 * phase.sin(),
            0.1 * phase.cos(),
            GRAVITY,
            0.0,
            0.0,
            0.05 * phase.sin(),
        ];
        let variances = [
            ACC_VARIANCE,
            ACC_VARIANCE,
            ACC_VARIANCE,
            GYRO_VARIANCE,
            GYRO_VARIANCE,
            GYRO_VARIANCE,
        ];
        let timestamp = t + self.correction;
        self.layout
            .assemble(timestamp, timestamp + self.delay, &values, Some(&variances))
            .map(Some)
    }
}
