//! Proprioceptive Specialization
//!
//! A proprioceptive reading is a numeric vector laid out as
//! `[timestamp, values.., uncertainty..]`, where the value columns are the
//! concatenation of the declared quantities and the uncertainty block depends
//! on the [`CovarianceMode`].

use std::ops::Range;

use ring_buffer::{Reading, SensorRing, UNWRITTEN_TIMESTAMP};
use serde::{Deserialize, Serialize};

use crate::error::SensorError;
use crate::quantity::{CovarianceMode, Quantity};
use crate::sensor::HardwareSensor;

/// Numeric reading: `data[0]` is the timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVec {
    pub data: Vec<f64>,
    pub arrival: f64,
}

impl RawVec {
    /// Unwritten reading of the given width
    pub fn unwritten(size: usize) -> Self {
        let mut data = vec![0.0; size.max(1)];
        data[0] = UNWRITTEN_TIMESTAMP;
        Self { data, arrival: 0.0 }
    }

    /// Everything after the timestamp
    pub fn values(&self) -> &[f64] {
        self.data.get(1..).unwrap_or(&[])
    }
}

impl Default for RawVec {
    fn default() -> Self {
        Self::unwritten(1)
    }
}

impl Reading for RawVec {
    fn timestamp(&self) -> f64 {
        self.data.first().copied().unwrap_or(UNWRITTEN_TIMESTAMP)
    }

    fn arrival(&self) -> f64 {
        self.arrival
    }
}

/// Column layout of the readings of one proprioceptive sensor
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingLayout {
    quantities: [Option<usize>; Quantity::COUNT],
    data_size: usize,
    obs_size: usize,
    covariance: CovarianceMode,
}

impl ReadingLayout {
    /// Empty layout
    pub fn new(covariance: CovarianceMode) -> Self {
        Self {
            quantities: [None; Quantity::COUNT],
            data_size: 0,
            obs_size: 0,
            covariance,
        }
    }

    /// Layout declaring `quantities` in order
    pub fn with_quantities(
        covariance: CovarianceMode,
        quantities: &[Quantity],
    ) -> Result<Self, SensorError> {
        let mut layout = Self::new(covariance);
        for &quantity in quantities {
            layout.add_quantity(quantity)?;
        }
        Ok(layout)
    }

    /// Append a quantity after the ones already declared; returns its first column
    pub fn add_quantity(&mut self, quantity: Quantity) -> Result<usize, SensorError> {
        if self.quantities[quantity.index()].is_some() {
            return Err(SensorError::DuplicateQuantity(quantity));
        }
        let offset = self.data_size + 1;
        self.quantities[quantity.index()] = Some(offset);
        self.data_size += quantity.data_width();
        self.obs_size += quantity.obs_width();
        Ok(offset)
    }

    pub fn clear_quantities(&mut self) {
        self.quantities = [None; Quantity::COUNT];
        self.data_size = 0;
        self.obs_size = 0;
    }

    /// Number of measured values (no timestamp, no uncertainty)
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Number of values usable as fusion observations
    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    /// Width of a full reading vector
    pub fn reading_size(&self) -> usize {
        self.covariance.reading_size(self.data_size)
    }

    pub fn covariance_mode(&self) -> CovarianceMode {
        self.covariance
    }

    /// First column of `quantity`, `None` if the sensor does not provide it
    pub fn get_quantity(&self, quantity: Quantity) -> Option<usize> {
        self.quantities[quantity.index()]
    }

    /// Columns holding `quantity`
    pub fn columns(&self, quantity: Quantity) -> Option<Range<usize>> {
        self.get_quantity(quantity)
            .map(|offset| offset..offset + quantity.data_width())
    }

    /// Declared quantities with their first column, in column order
    pub fn quantities(&self) -> Vec<(Quantity, usize)> {
        let mut declared: Vec<_> = Quantity::ALL
            .iter()
            .filter_map(|&q| self.get_quantity(q).map(|offset| (q, offset)))
            .collect();
        declared.sort_by_key(|&(_, offset)| offset);
        declared
    }

    /// Size every slot of `ring` to the reading width and mark it unwritten
    pub fn init_data(&self, ring: &mut SensorRing<RawVec>) {
        let size = self.reading_size();
        ring.reset_slots(|| RawVec::unwritten(size));
    }

    /// Build a reading from its values and optional per-value variances.
    ///
    /// Missing variances are stored as zeros; in `Full` mode the variances
    /// fill the diagonal and off-diagonal terms are zero.
    pub fn assemble(
        &self,
        timestamp: f64,
        arrival: f64,
        values: &[f64],
        variances: Option<&[f64]>,
    ) -> Result<RawVec, SensorError> {
        if values.len() != self.data_size {
            return Err(SensorError::LayoutMismatch {
                expected: self.data_size,
                actual: values.len(),
            });
        }
        if let Some(variances) = variances {
            if variances.len() != self.data_size {
                return Err(SensorError::LayoutMismatch {
                    expected: self.data_size,
                    actual: variances.len(),
                });
            }
        }
        let variance = |i: usize| variances.map_or(0.0, |v| v[i]);

        let mut data = Vec::with_capacity(self.reading_size());
        data.push(timestamp);
        data.extend_from_slice(values);
        match self.covariance {
            CovarianceMode::None => {}
            CovarianceMode::Variance => data.extend((0..self.data_size).map(variance)),
            CovarianceMode::Full => {
                for i in 0..self.data_size {
                    data.push(variance(i));
                    data.extend(std::iter::repeat(0.0).take(self.data_size - i - 1));
                }
            }
        }
        Ok(RawVec { data, arrival })
    }

    /// Covariance between values `i` and `j` (0-based, timestamp excluded)
    pub fn covariance(&self, reading: &RawVec, i: usize, j: usize) -> Option<f64> {
        let n = self.data_size;
        if i >= n || j >= n {
            return None;
        }
        let base = 1 + n;
        let offset = match self.covariance {
            CovarianceMode::None => return None,
            CovarianceMode::Variance if i == j => base + i,
            CovarianceMode::Variance => return Some(0.0),
            CovarianceMode::Full => {
                let (row, col) = if i <= j { (i, j) } else { (j, i) };
                // row-major upper triangle
                base + row * n - row * row.saturating_sub(1) / 2 + col - row
            }
        };
        reading.data.get(offset).copied()
    }
}

/// A sensor producing numeric readings.
///
/// Implementors classify their value columns: instantaneous physical
/// quantities are integrated by the estimator, increments (odometry deltas)
/// are summed.
pub trait ProprioSensor: HardwareSensor<Raw = RawVec> {
    fn layout(&self) -> &ReadingLayout;

    /// Reading-vector columns holding instantaneous values
    fn instant_values(&self) -> Vec<usize>;

    /// Reading-vector columns holding increments since the previous reading
    fn increment_values(&self) -> Vec<usize>;
}
