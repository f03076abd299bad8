//! Sensor Acquisition Runner
//!
//! Starts the configured sensors on a shared data signal and runs the
//! consumer role the estimator plays in the full pipeline:
//! - IMU readings are taken as fixed-length time windows
//! - odometry increments are consumed one by one and accumulated
//! - camera frames are taken latest-first, skipping the ones it fell behind on

use std::path::PathBuf;
use std::time::Duration;

use hardware_sensor::{
    CameraReplay, HardwareSensor, OdometryReplay, OverflowPolicy, ProprioSensor, RawImage,
    SensorConfig, SensorError, SimulatedImu,
};
use ring_buffer::{DataSignal, Fetch, Reading};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub imu: SensorConfig,
    /// Stop the IMU after this many readings
    pub imu_samples: Option<u64>,
    pub odometry: SensorConfig,
    /// JSON-lines odometry log, no odometry when unset
    pub odometry_log: Option<PathBuf>,
    pub camera: SensorConfig,
    /// Frame directory, no camera when unset
    pub camera_dir: Option<PathBuf>,
    /// Pace sensors at their data period instead of replaying flat out
    pub realtime: bool,
    /// Maximum run time (s)
    pub run_seconds: f64,
    /// Length of the IMU windows handed to the estimator (s)
    pub window_seconds: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            imu: SensorConfig::imu(),
            imu_samples: None,
            odometry: SensorConfig::odometry(),
            odometry_log: None,
            camera: SensorConfig::camera(),
            camera_dir: None,
            realtime: true,
            run_seconds: 10.0,
            window_seconds: 0.1,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), SensorError> {
        if !(self.run_seconds.is_finite() && self.run_seconds > 0.0) {
            return Err(SensorError::InvalidConfig(format!(
                "run_seconds must be positive, got {}",
                self.run_seconds
            )));
        }
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(SensorError::InvalidConfig(format!(
                "window_seconds must be positive, got {}",
                self.window_seconds
            )));
        }
        self.imu.validate()?;
        if self.imu.overflow_policy == OverflowPolicy::Block {
            // a window plus the reading before it and the last consumed one
            let needed = (self.window_seconds / self.imu.data_period).ceil() as usize + 2;
            if self.imu.buffer_size < needed {
                return Err(SensorError::InvalidConfig(format!(
                    "imu: buffer_size {} cannot hold a {} s window ({} readings needed)",
                    self.imu.buffer_size, self.window_seconds, needed
                )));
            }
        }
        if self.odometry_log.is_some() {
            self.odometry.validate()?;
        }
        if self.camera_dir.is_some() {
            self.camera.validate()?;
        }
        Ok(())
    }
}

/// What the consumer saw during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub imu_windows: u64,
    pub imu_readings: u64,
    /// Mean vertical acceleration over all windows
    pub mean_vertical_acc: f64,
    pub odometry_readings: u64,
    /// Sum of the odometry increments
    pub odometry_pose: [f64; 6],
    pub frames: u64,
    pub frames_skipped: u64,
}

/// Sensors plus the consumer state
pub struct Pipeline {
    signal: DataSignal,
    imu: SimulatedImu,
    odometry: Option<OdometryReplay>,
    camera: Option<CameraReplay>,
    window: f64,
    horizon: f64,
    imu_done: bool,
    odometry_done: bool,
    camera_done: bool,
    vertical_acc_sum: f64,
    summary: RunSummary,
}

impl Pipeline {
    pub fn from_config(config: &AppConfig) -> Result<Self, SensorError> {
        let signal = DataSignal::new();

        let mut imu = SimulatedImu::new(config.imu.clone())?.with_data_signal(signal.clone());
        if let Some(samples) = config.imu_samples {
            imu = imu.with_sample_limit(samples);
        }
        if !config.realtime {
            imu = imu.without_pacing();
        }

        let odometry = match &config.odometry_log {
            Some(path) => {
                let replay = OdometryReplay::from_log(config.odometry.clone(), path)?
                    .with_data_signal(signal.clone());
                Some(if config.realtime {
                    replay.with_real_time_pacing()
                } else {
                    replay
                })
            }
            None => None,
        };

        let camera = match &config.camera_dir {
            Some(dir) => {
                let replay = CameraReplay::from_directory(config.camera.clone(), dir)?
                    .with_data_signal(signal.clone());
                Some(if config.realtime {
                    replay.with_real_time_pacing()
                } else {
                    replay
                })
            }
            None => None,
        };

        Ok(Self {
            signal,
            imu,
            odometry_done: odometry.is_none(),
            camera_done: camera.is_none(),
            odometry,
            camera,
            window: config.window_seconds,
            horizon: 0.0,
            imu_done: false,
            vertical_acc_sum: 0.0,
            summary: RunSummary::default(),
        })
    }

    pub fn start(&mut self) -> Result<(), SensorError> {
        self.imu.start()?;
        if let Some(odometry) = &mut self.odometry {
            odometry.start()?;
        }
        if let Some(camera) = &mut self.camera {
            camera.start()?;
        }
        info!("Pipeline started");
        Ok(())
    }

    /// Consume until every stream ended or `duration` elapsed, then stop the sensors
    pub async fn run(&mut self, duration: Duration) -> Result<RunSummary, SensorError> {
        let mut data = self.signal.subscribe();
        let deadline = tokio::time::Instant::now() + duration;

        let consumed = loop {
            if let Err(e) = self.poll() {
                break Err(e);
            }
            if self.is_finished() {
                info!("All sensor streams ended");
                break Ok(());
            }
            tokio::select! {
                changed = data.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!("Run time elapsed");
                    break Ok(());
                }
            }
        };

        let stopped = self.stop();
        consumed?;
        stopped?;
        Ok(self.summary())
    }

    pub fn is_finished(&self) -> bool {
        self.imu_done && self.odometry_done && self.camera_done
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = self.summary.clone();
        if summary.imu_windows > 0 {
            summary.mean_vertical_acc = self.vertical_acc_sum / summary.imu_readings as f64;
        }
        summary
    }

    /// Consume whatever every sensor has made available
    pub fn poll(&mut self) -> Result<(), SensorError> {
        if !self.imu_done {
            self.poll_imu()?;
        }
        if !self.odometry_done {
            self.poll_odometry()?;
        }
        if !self.camera_done {
            self.poll_camera();
        }
        Ok(())
    }

    fn poll_imu(&mut self) -> Result<(), SensorError> {
        let ring = self.imu.ring().clone();
        let columns = self.imu.instant_values();
        loop {
            let newest = ring.last_timestamp();
            let end = self.horizon + self.window;
            let ended = ring.is_end_of_stream();
            // a full ring blocks the writer: take what is there instead of waiting
            let full = ring.is_full();
            if newest < end && !ended && !full {
                return Ok(());
            }
            if newest <= self.horizon {
                // nothing left past the horizon
                if ended {
                    if let Some(id) = ring.cursors().last_unread() {
                        ring.release(id)?;
                    }
                    ring.release_held();
                    info!("IMU stream consumed up to t={:.3}", self.horizon);
                    self.imu_done = true;
                }
                return Ok(());
            }

            let end = end.min(newest);
            let window = ring.get_raws(self.horizon, end, true)?;
            let fresh: Vec<_> = window
                .readings()
                .iter()
                .filter(|r| r.timestamp() > self.horizon && r.timestamp() <= end)
                .collect();
            let z = columns.get(2).copied();
            for reading in &fresh {
                if let Some(column) = z {
                    self.vertical_acc_sum += reading.data[column];
                }
            }
            debug!(
                "IMU window ({:.3}, {:.3}]: {} readings, {} with margins",
                self.horizon,
                end,
                fresh.len(),
                window.len()
            );
            self.summary.imu_windows += 1;
            self.summary.imu_readings += fresh.len() as u64;
            self.horizon = end;

            // keep the last consumed reading and its predecessor for the next window
            if let Some(last) = window.readings().iter().rposition(|r| r.timestamp() <= end) {
                if last > 0 {
                    ring.release_until(window.ids()[last - 1])?;
                }
            }
        }
    }

    fn poll_odometry(&mut self) -> Result<(), SensorError> {
        let Some(odometry) = &self.odometry else {
            return Ok(());
        };
        let ring = odometry.ring().clone();
        let columns = odometry.increment_values();
        loop {
            match ring.next_raw_info() {
                Fetch::Data(info) => {
                    let reading = ring.get_raw(info.id)?;
                    for (pose, &column) in self.summary.odometry_pose.iter_mut().zip(&columns) {
                        *pose += reading.data[column];
                    }
                    self.summary.odometry_readings += 1;
                }
                Fetch::NoDataYet => return Ok(()),
                Fetch::EndOfStream => {
                    ring.release_held();
                    info!(
                        "Odometry stream consumed: {} readings",
                        self.summary.odometry_readings
                    );
                    self.odometry_done = true;
                    return Ok(());
                }
            }
        }
    }

    fn poll_camera(&mut self) {
        let Some(camera) = &self.camera else {
            return;
        };
        let ring = camera.ring();
        match ring.get_last_unread_raw() {
            Fetch::Data(latest) => {
                if let Some(frame) = latest.reading.downcast::<RawImage>() {
                    debug!(
                        "Frame {} at t={:.3}: {}x{}, mean intensity {:.1}",
                        frame.sequence,
                        frame.timestamp,
                        frame.width(),
                        frame.height(),
                        frame.mean_intensity()
                    );
                }
                if latest.missed > 0 {
                    warn!("Camera consumer skipped {} frames", latest.missed);
                }
                ring.release_held();
                self.summary.frames += 1;
                self.summary.frames_skipped += latest.missed as u64;
            }
            Fetch::NoDataYet => {}
            Fetch::EndOfStream => {
                info!("Camera stream consumed: {} frames", self.summary.frames);
                self.camera_done = true;
            }
        }
    }

    /// Stop every started sensor, reporting the first failure
    pub fn stop(&mut self) -> Result<(), SensorError> {
        let mut result = Ok(());
        let mut record = |outcome: Result<u64, SensorError>, name: &str| match outcome {
            Ok(written) => info!("Sensor '{}' stopped after {} readings", name, written),
            Err(e) => {
                warn!("Sensor '{}' stopped with error: {}", name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        };

        if self.imu.is_started() {
            let outcome = self.imu.stop();
            record(outcome, "imu");
        }
        if let Some(odometry) = self.odometry.as_mut().filter(|s| s.is_started()) {
            let outcome = odometry.stop();
            record(outcome, "odometry");
        }
        if let Some(camera) = self.camera.as_mut().filter(|s| s.is_started()) {
            let outcome = camera.stop();
            record(outcome, "camera");
        }
        result
    }
}
