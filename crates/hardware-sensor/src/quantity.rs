//! Catalogue of the physical quantities a proprioceptive reading may contain

use serde::{Deserialize, Serialize};

/// Quantities a proprioceptive sensor can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Position (x y z)
    Pos,
    /// Orientation quaternion (qx qy qz qw)
    OriQuat,
    /// Orientation Euler angles (ex ey ez)
    OriEuler,
    /// Linear velocity in the sensor frame
    Vel,
    /// Linear velocity in the world frame
    AbsVel,
    /// Angular velocity in the sensor frame
    AngVel,
    /// Angular velocity in the world frame
    AbsAngVel,
    /// Acceleration in the sensor frame
    Acc,
    /// Acceleration in the world frame
    AbsAcc,
    /// Direction between the robot and a known position (x y z ux uy uz),
    /// the direction always oriented from the robot
    BundleObs,
    /// Magnetic field
    Mag,
}

impl Quantity {
    pub const COUNT: usize = 11;

    pub const ALL: [Quantity; Quantity::COUNT] = [
        Quantity::Pos,
        Quantity::OriQuat,
        Quantity::OriEuler,
        Quantity::Vel,
        Quantity::AbsVel,
        Quantity::AngVel,
        Quantity::AbsAngVel,
        Quantity::Acc,
        Quantity::AbsAcc,
        Quantity::BundleObs,
        Quantity::Mag,
    ];

    /// Position in the catalogue
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Number of columns in the raw-data layout
    pub const fn data_width(self) -> usize {
        match self {
            Quantity::OriQuat => 4,
            Quantity::BundleObs => 6,
            _ => 3,
        }
    }

    /// Number of columns usable as a fusion observation
    pub const fn obs_width(self) -> usize {
        match self {
            Quantity::OriQuat => 4,
            // a unit direction has two degrees of freedom
            Quantity::BundleObs => 2,
            _ => 3,
        }
    }
}

/// Uncertainty block appended to each reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceMode {
    /// Values only
    #[default]
    None,
    /// One variance per value
    Variance,
    /// Upper triangle of the full covariance, diagonal included
    Full,
}

impl CovarianceMode {
    /// Width of a reading vector (timestamp included) holding `data_size` values
    pub const fn reading_size(self, data_size: usize) -> usize {
        match self {
            CovarianceMode::None => 1 + data_size,
            CovarianceMode::Variance => 1 + 2 * data_size,
            CovarianceMode::Full => 1 + data_size * (data_size + 3) / 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_order() {
        for (i, quantity) in Quantity::ALL.iter().enumerate() {
            assert_eq!(quantity.index(), i);
        }
    }

    #[test]
    fn test_widths() {
        assert_eq!(Quantity::Pos.data_width(), 3);
        assert_eq!(Quantity::OriQuat.data_width(), 4);
        assert_eq!(Quantity::BundleObs.data_width(), 6);
        assert_eq!(Quantity::BundleObs.obs_width(), 2);
        assert_eq!(Quantity::Mag.obs_width(), 3);
    }

    #[test]
    fn test_reading_sizes() {
        assert_eq!(CovarianceMode::None.reading_size(7), 8);
        assert_eq!(CovarianceMode::Variance.reading_size(7), 15);
        assert_eq!(CovarianceMode::Full.reading_size(3), 10);
    }

    #[test]
    fn test_serde_names() {
        let mode: CovarianceMode = serde_json::from_str("\"variance\"").unwrap();
        assert_eq!(mode, CovarianceMode::Variance);
        let quantity: Quantity = serde_json::from_str("\"ori_quat\"").unwrap();
        assert_eq!(quantity, Quantity::OriQuat);
    }
}
