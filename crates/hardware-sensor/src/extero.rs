//! Exteroceptive Specialization
//!
//! Exteroceptive readings are opaque shared handles: the ring only needs
//! their timestamps, the consumer downcasts to the concrete measurement.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use image::GrayImage;
use ring_buffer::{Reading, UNWRITTEN_TIMESTAMP};

use crate::sensor::HardwareSensor;

/// A raw measurement produced by an exteroceptive sensor
pub trait RawMeasurement: Send + Sync + fmt::Debug {
    fn timestamp(&self) -> f64;

    fn arrival(&self) -> f64;

    fn as_any(&self) -> &dyn Any;
}

/// Ring slot holding a shared raw measurement, empty until written
#[derive(Debug, Clone, Default)]
pub struct RawSlot(Option<Arc<dyn RawMeasurement>>);

impl RawSlot {
    pub fn new(raw: Arc<dyn RawMeasurement>) -> Self {
        Self(Some(raw))
    }

    pub fn from_raw<R: RawMeasurement + 'static>(raw: R) -> Self {
        Self(Some(Arc::new(raw)))
    }

    pub fn raw(&self) -> Option<&Arc<dyn RawMeasurement>> {
        self.0.as_ref()
    }

    /// Concrete measurement, if the slot holds an `R`
    pub fn downcast<R: 'static>(&self) -> Option<&R> {
        self.0.as_ref()?.as_any().downcast_ref::<R>()
    }
}

impl Reading for RawSlot {
    fn timestamp(&self) -> f64 {
        self.0.as_ref().map_or(UNWRITTEN_TIMESTAMP, |raw| raw.timestamp())
    }

    fn arrival(&self) -> f64 {
        self.0.as_ref().map_or(0.0, |raw| raw.arrival())
    }
}

/// Grayscale camera frame
#[derive(Debug, Clone)]
pub struct RawImage {
    pub image: GrayImage,
    pub timestamp: f64,
    pub arrival: f64,
    /// Frame sequence number
    pub sequence: u64,
}

impl RawImage {
    pub fn new(image: GrayImage, timestamp: f64, arrival: f64, sequence: u64) -> Self {
        Self {
            image,
            timestamp,
            arrival,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average pixel intensity (0-255)
    pub fn mean_intensity(&self) -> f64 {
        let pixels = self.image.as_raw();
        if pixels.is_empty() {
            return 0.0;
        }
        pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64
    }
}

impl RawMeasurement for RawImage {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn arrival(&self) -> f64 {
        self.arrival
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A sensor producing opaque raw measurements
pub trait ExteroSensor: HardwareSensor<Raw = RawSlot> {}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use ring_buffer::SensorRing;

    fn frame(t: f64, level: u8) -> RawSlot {
        let image = GrayImage::from_pixel(4, 3, Luma([level]));
        RawSlot::from_raw(RawImage::new(image, t, t + 0.02, 0))
    }

    #[test]
    fn test_empty_slot_is_unwritten() {
        let slot = RawSlot::default();
        assert!(!slot.is_written());
        assert!(slot.raw().is_none());
        assert!(slot.downcast::<RawImage>().is_none());
    }

    #[test]
    fn test_downcast_image() {
        let slot = frame(1.0, 128);
        let image = slot.downcast::<RawImage>().unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 3);
        assert!((image.mean_intensity() - 128.0).abs() < 1e-9);
        assert_eq!(slot.timestamp(), 1.0);
        assert!((slot.arrival() - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_ring_of_handles() {
        let ring = SensorRing::<RawSlot>::new("camera", 3);
        ring.push(frame(0.1, 10)).unwrap();
        ring.push(frame(0.2, 20)).unwrap();

        let window = ring.get_raws(0.15, 0.2, false).unwrap();
        assert_eq!(window.timestamps(), vec![0.1, 0.2]);
        let latest = ring.get_last_unread_raw().data().unwrap();
        assert_eq!(latest.missed, 1);
        let image = latest.reading.downcast::<RawImage>().unwrap();
        assert!((image.mean_intensity() - 20.0).abs() < 1e-9);
    }
}
