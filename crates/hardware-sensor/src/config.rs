//! Sensor configuration

use std::path::Path;

use ring_buffer::DEFAULT_CAPACITY;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::quantity::CovarianceMode;

/// Prefix of environment variables overriding file configuration
pub const ENV_PREFIX: &str = "ACQ";

/// What the acquisition thread does when the ring is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the run with a buffer overflow (live sensors)
    #[default]
    Fail,
    /// Wait for the consumer to release slots (offline replay)
    Block,
}

/// Per-sensor configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Sensor name, used in logs and metrics
    pub name: String,
    /// Ring capacity in readings
    pub buffer_size: usize,
    /// Uncertainty block of proprioceptive readings
    pub covariance: CovarianceMode,
    /// Offset added to sensor timestamps to reach the reference clock (s)
    pub timestamps_correction: f64,
    /// Expected interval between readings (s)
    pub data_period: f64,
    /// Expected latency between an event and its availability (s)
    pub arrival_delay: f64,
    pub overflow_policy: OverflowPolicy,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "sensor".to_string(),
            buffer_size: DEFAULT_CAPACITY,
            covariance: CovarianceMode::None,
            timestamps_correction: 0.0,
            data_period: 0.01,
            arrival_delay: 0.0,
            overflow_policy: OverflowPolicy::Fail,
        }
    }
}

impl SensorConfig {
    /// Inertial unit at 100 Hz
    pub fn imu() -> Self {
        Self {
            name: "imu".to_string(),
            buffer_size: 1000,
            covariance: CovarianceMode::Variance,
            data_period: 0.01,
            arrival_delay: 0.002,
            ..Default::default()
        }
    }

    /// Wheel odometry log replayed at 20 Hz
    pub fn odometry() -> Self {
        Self {
            name: "odometry".to_string(),
            buffer_size: 200,
            data_period: 0.05,
            overflow_policy: OverflowPolicy::Block,
            ..Default::default()
        }
    }

    /// Camera frames replayed at 30 fps
    pub fn camera() -> Self {
        Self {
            name: "camera".to_string(),
            buffer_size: 30,
            data_period: 1.0 / 30.0,
            arrival_delay: 0.02,
            overflow_policy: OverflowPolicy::Block,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SensorError> {
        if self.buffer_size < 2 {
            return Err(SensorError::InvalidConfig(format!(
                "{}: buffer_size must be at least 2, got {}",
                self.name, self.buffer_size
            )));
        }
        if !(self.data_period.is_finite() && self.data_period > 0.0) {
            return Err(SensorError::InvalidConfig(format!(
                "{}: data_period must be positive, got {}",
                self.name, self.data_period
            )));
        }
        if !(self.arrival_delay.is_finite() && self.arrival_delay >= 0.0) {
            return Err(SensorError::InvalidConfig(format!(
                "{}: arrival_delay must be non-negative, got {}",
                self.name, self.arrival_delay
            )));
        }
        if !self.timestamps_correction.is_finite() {
            return Err(SensorError::InvalidConfig(format!(
                "{}: timestamps_correction must be finite",
                self.name
            )));
        }
        Ok(())
    }
}

/// Load a configuration from an optional file, overridden by `ACQ__*` environment variables
pub fn load_config<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, SensorError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_presets_are_valid() {
        for config in [SensorConfig::default(), SensorConfig::imu(), SensorConfig::odometry(), SensorConfig::camera()] {
            assert!(config.validate().is_ok(), "{} preset invalid", config.name);
        }
        assert_eq!(SensorConfig::odometry().overflow_policy, OverflowPolicy::Block);
    }

    #[test]
    fn test_validation_errors() {
        let config = SensorConfig {
            buffer_size: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SensorError::InvalidConfig(_))));

        let config = SensorConfig {
            data_period: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SensorConfig {
            arrival_delay: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("sensor-config-{}.toml", std::process::id()));
        fs::write(
            &path,
            "name = \"gps\"\nbuffer_size = 16\ncovariance = \"full\"\noverflow_policy = \"block\"\n",
        )
        .unwrap();

        let config: SensorConfig = load_config(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.name, "gps");
        assert_eq!(config.buffer_size, 16);
        assert_eq!(config.covariance, CovarianceMode::Full);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.data_period, SensorConfig::default().data_period);
    }
}
