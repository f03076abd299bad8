//! Wheel Odometry Replay
//!
//! Replays a recorded odometry log, one JSON object per line:
//!
//! ```text
//! {"timestamp": 0.05, "values": [0.01, 0.0, 0.0, 0.0, 0.0, 0.002]}
//! ```
//!
//! Values are the position and Euler-angle increments since the previous
//! record. Empty lines and lines starting with `#` are skipped.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ring_buffer::{DataSignal, SensorRing};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::acquisition::{Acquisition, ReadingSource};
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::proprio::{ProprioSensor, RawVec, ReadingLayout};
use crate::quantity::Quantity;
use crate::sensor::{build_ring, HardwareSensor};

/// One line of an odometry log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryRecord {
    /// Sensor clock (s)
    pub timestamp: f64,
    pub values: Vec<f64>,
    #[serde(default)]
    pub variances: Option<Vec<f64>>,
    /// Recorded availability time, defaults to timestamp plus arrival delay
    #[serde(default)]
    pub arrival: Option<f64>,
}

/// Parse an odometry log
pub fn read_log(path: &Path) -> Result<Vec<OdometryRecord>, SensorError> {
    let content = fs::read_to_string(path)?;
    parse_log(&content)
}

fn parse_log(content: &str) -> Result<Vec<OdometryRecord>, SensorError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| SensorError::ReplayLog {
                line: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

pub struct OdometryReplay {
    config: SensorConfig,
    layout: ReadingLayout,
    ring: Arc<SensorRing<RawVec>>,
    records: Vec<OdometryRecord>,
    acquisition: Option<Acquisition<RawVec>>,
    started: bool,
    paced: bool,
}

impl OdometryReplay {
    pub fn from_records(
        config: SensorConfig,
        records: Vec<OdometryRecord>,
    ) -> Result<Self, SensorError> {
        config.validate()?;
        let layout =
            ReadingLayout::with_quantities(config.covariance, &[Quantity::Pos, Quantity::OriEuler])?;
        let mut ring = build_ring(&config, DataSignal::new());
        layout.init_data(&mut ring);

        Ok(Self {
            config,
            layout,
            ring: Arc::new(ring),
            records,
            acquisition: None,
            started: false,
            paced: false,
        })
    }

    pub fn from_log(config: SensorConfig, path: &Path) -> Result<Self, SensorError> {
        let records = read_log(path)?;
        info!("Loaded {} odometry records from {}", records.len(), path.display());
        Self::from_records(config, records)
    }

    /// Raise `signal` on every reading, to share one wake-up with other sensors
    pub fn with_data_signal(mut self, signal: DataSignal) -> Self {
        let mut ring = build_ring(&self.config, signal);
        self.layout.init_data(&mut ring);
        self.ring = Arc::new(ring);
        self
    }

    /// Replay at the configured data period instead of as fast as possible
    pub fn with_real_time_pacing(mut self) -> Self {
        self.paced = true;
        self
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl HardwareSensor for OdometryReplay {
    type Raw = RawVec;

    fn ring(&self) -> &Arc<SensorRing<RawVec>> {
        &self.ring
    }

    fn start(&mut self) -> Result<(), SensorError> {
        if self.started {
            return Err(SensorError::AlreadyStarted(self.config.name.clone()));
        }
        let source = ReplaySource {
            layout: self.layout.clone(),
            records: std::mem::take(&mut self.records).into_iter(),
            correction: self.config.timestamps_correction,
            delay: self.config.arrival_delay,
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

impl ProprioSensor for OdometryReplay {
    fn layout(&self) -> &ReadingLayout {
        &self.layout
    }

    fn instant_values(&self) -> Vec<usize> {
        Vec::new()
    }

    fn increment_values(&self) -> Vec<usize> {
        [Quantity::Pos, Quantity::OriEuler]
            .iter()
            .filter_map(|&q| self.layout.columns(q))
            .flatten()
            .collect()
    }
}

struct ReplaySource {
    layout: ReadingLayout,
    records: std::vec::IntoIter<OdometryRecord>,
    correction: f64,
    delay: f64,
}

impl ReadingSource<RawVec> for ReplaySource {
    fn next_reading(&mut self) -> Result<Option<RawVec>, SensorError> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        let timestamp = record.timestamp + self.correction;
        let arrival = record
            .arrival
            .map_or(timestamp + self.delay, |arrival| arrival + self.correction);
        self.layout
            .assemble(timestamp, arrival, &record.values, record.variances.as_deref())
            .map(Some)
    }
}
