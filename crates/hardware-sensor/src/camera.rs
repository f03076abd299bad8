//! Camera Replay
//!
//! Replays grayscale frames, either held in memory or loaded lazily from an
//! image directory in file-name order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::GrayImage;
use ring_buffer::{DataSignal, SensorRing};
use tracing::{debug, info};

use crate::acquisition::{Acquisition, ReadingSource};
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::extero::{ExteroSensor, RawImage, RawSlot};
use crate::sensor::{build_ring, HardwareSensor};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pgm"];

enum Frames {
    Memory(Vec<GrayImage>),
    Directory(Vec<PathBuf>),
}

impl Frames {
    fn len(&self) -> usize {
        match self {
            Frames::Memory(frames) => frames.len(),
            Frames::Directory(paths) => paths.len(),
        }
    }
}

pub struct CameraReplay {
    config: SensorConfig,
    ring: Arc<SensorRing<RawSlot>>,
    frames: Option<Frames>,
    frame_count: usize,
    acquisition: Option<Acquisition<RawSlot>>,
    started: bool,
    paced: bool,
}

impl CameraReplay {
    pub fn from_frames(config: SensorConfig, frames: Vec<GrayImage>) -> Result<Self, SensorError> {
        Self::with_frames(config, Frames::Memory(frames))
    }

    /// Replay every image file of `dir`, sorted by file name
    pub fn from_directory(config: SensorConfig, dir: &Path) -> Result<Self, SensorError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        info!("Found {} frames in {}", paths.len(), dir.display());
        Self::with_frames(config, Frames::Directory(paths))
    }

    fn with_frames(config: SensorConfig, frames: Frames) -> Result<Self, SensorError> {
        config.validate()?;
        let ring = build_ring(&config, DataSignal::new());
        Ok(Self {
            config,
            ring: Arc::new(ring),
            frame_count: frames.len(),
            frames: Some(frames),
            acquisition: None,
            started: false,
            paced: false,
        })
    }

    /// Raise `signal` on every frame
    pub fn with_data_signal(mut self, signal: DataSignal) -> Self {
        self.ring = Arc::new(build_ring(&self.config, signal));
        self
    }

    /// Replay at the configured frame rate
    pub fn with_real_time_pacing(mut self) -> Self {
        self.paced = true;
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

impl HardwareSensor for CameraReplay {
    type Raw = RawSlot;

    fn ring(&self) -> &Arc<SensorRing<RawSlot>> {
        &self.ring
    }

    fn start(&mut self) -> Result<(), SensorError> {
        if self.started {
            return Err(SensorError::AlreadyStarted(self.config.name.clone()));
        }
        let frames = match self.frames.take() {
            Some(Frames::Memory(frames)) => FrameIter::Memory(frames.into_iter()),
            Some(Frames::Directory(paths)) => FrameIter::Directory(paths.into_iter()),
            None => return Err(SensorError::AlreadyStarted(self.config.name.clone())),
        };
        let source = FrameSource {
            frames,
            next: 0,
            period: self.config.data_period,
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

impl ExteroSensor for CameraReplay {}

enum FrameIter {
    Memory(std::vec::IntoIter<GrayImage>),
    Directory(std::vec::IntoIter<PathBuf>),
}

struct FrameSource {
    frames: FrameIter,
    next: usize,
    period: f64,
    correction: f64,
    delay: f64,
}

impl ReadingSource<RawSlot> for FrameSource {
    fn next_reading(&mut self) -> Result<Option<RawSlot>, SensorError> {
        let index = self.next;
        let image = match &mut self.frames {
            FrameIter::Memory(frames) => frames.next(),
            FrameIter::Directory(paths) => match paths.next() {
                Some(path) => {
                    // a frame failing to load keeps its slot in the sequence
                    self.next += 1;
                    debug!("Loading frame {}", path.display());
                    Some(image::open(&path)?.to_luma8())
                }
                None => None,
            },
        };
        let Some(image) = image else {
            return Ok(None);
        };
        self.next = index + 1;

        let timestamp = (index + 1) as f64 * self.period + self.correction;
        let raw = RawImage::new(image, timestamp, timestamp + self.delay, index as u64);
        Ok(Some(RawSlot::from_raw(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use ring_buffer::{Fetch, Reading};

    fn frames(count: u8) -> Vec<GrayImage> {
        (0..count)
            .map(|i| GrayImage::from_pixel(8, 6, Luma([i * 10])))
            .collect()
    }

    fn config() -> SensorConfig {
        SensorConfig {
            data_period: 0.1,
            arrival_delay: 0.02,
            ..SensorConfig::camera()
        }
    }

    #[test]
    fn test_replay_from_memory() {
        let mut camera = CameraReplay::from_frames(config(), frames(3)).unwrap();
        assert_eq!(camera.frame_count(), 3);
        camera.start().unwrap();
        assert!(matches!(camera.start(), Err(SensorError::AlreadyStarted(_))));

        let ring = camera.ring().clone();
        let mut seen = Vec::new();
        loop {
            match ring.next_raw_info() {
                Fetch::Data(info) => {
                    let slot = ring.get_raw(info.id).unwrap();
                    let frame = slot.downcast::<RawImage>().unwrap();
                    assert!((frame.timestamp - info.timestamp).abs() < 1e-12);
                    assert!((slot.arrival() - frame.timestamp - 0.02).abs() < 1e-9);
                    seen.push((frame.sequence, frame.mean_intensity()));
                    ring.release(info.id).unwrap();
                }
                Fetch::NoDataYet => std::thread::sleep(Duration::from_millis(1)),
                Fetch::EndOfStream => break,
            }
        }
        assert_eq!(seen, vec![(0, 0.0), (1, 10.0), (2, 20.0)]);
        assert_eq!(camera.stop().unwrap(), 3);
    }

    #[test]
    fn test_frame_timestamps() {
        let mut camera = CameraReplay::from_frames(config(), frames(2)).unwrap();
        camera.start().unwrap();
        while !camera.ring().is_end_of_stream() {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!((camera.ring().raw_timestamp(0).unwrap() - 0.1).abs() < 1e-9);
        assert!((camera.ring().raw_timestamp(1).unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(camera.stop().unwrap(), 2);
    }

    #[test]
    fn test_replay_from_directory() {
        let dir = std::env::temp_dir().join(format!("camera-replay-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for (i, frame) in frames(3).iter().enumerate() {
            frame.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut camera = CameraReplay::from_directory(config(), &dir).unwrap();
        assert_eq!(camera.frame_count(), 3);
        camera.start().unwrap();
        while !camera.ring().is_end_of_stream() {
            std::thread::sleep(Duration::from_millis(1));
        }
        let written = camera.stop().unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(written, 3);
        let last = camera.ring().get_raw(2).unwrap();
        let frame = last.downcast::<RawImage>().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(frame.mean_intensity(), 20.0);
    }
}
