//! Hardware Sensor Acquisition
//!
//! Specializes the sensor ring for the two families of sensors feeding the
//! localization filter:
//! - proprioceptive sensors (IMU, odometry, GPS) storing fixed-layout numeric
//!   readings built from a catalogue of physical quantities
//! - exteroceptive sensors (cameras) storing opaque raw measurements
//!
//! Each sensor owns a ring and a dedicated acquisition thread that fills it.

pub mod acquisition;
pub mod camera;
pub mod config;
pub mod extero;
pub mod imu;
pub mod odometry;
pub mod proprio;
pub mod quantity;
pub mod sensor;

mod error;

pub use acquisition::{Acquisition, ReadingSource};
pub use camera::CameraReplay;
pub use config::{load_config, OverflowPolicy, SensorConfig};
pub use error::SensorError;
pub use extero::{ExteroSensor, RawImage, RawMeasurement, RawSlot};
pub use imu::SimulatedImu;
pub use odometry::{OdometryRecord, OdometryReplay};
pub use proprio::{ProprioSensor, RawVec, ReadingLayout};
pub use quantity::{CovarianceMode, Quantity};
pub use sensor::{HardwareSensor, SensorState};
