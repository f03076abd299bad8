//! Minimal reading type shared by the unit tests

use crate::{Reading, SensorRing, UNWRITTEN_TIMESTAMP};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn at(timestamp: f64) -> Self {
        Self {
            timestamp,
            value: timestamp * 10.0,
        }
    }
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            timestamp: UNWRITTEN_TIMESTAMP,
            value: 0.0,
        }
    }
}

impl Reading for Sample {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn arrival(&self) -> f64 {
        self.timestamp + 0.005
    }
}

/// Ring with readings at 1.0, 2.0, .. `count` already pushed
pub fn filled_ring(capacity: usize, count: usize) -> SensorRing<Sample> {
    let ring = SensorRing::new("test", capacity);
    for i in 1..=count {
        ring.push(Sample::at(i as f64)).expect("push within capacity");
    }
    ring
}
