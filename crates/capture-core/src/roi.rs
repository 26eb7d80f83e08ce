//! Region-of-interest descriptors.

use crate::constraint::RangeConstraint;
use std::fmt;

/// One rectangular readout region, in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// Left edge, in sensor pixels.
    pub x: i32,
    /// Top edge, in sensor pixels.
    pub y: i32,
    /// Width in sensor pixels.
    pub width: i32,
    /// Height in sensor pixels.
    pub height: i32,
    /// Horizontal binning factor.
    pub x_binning: i32,
    /// Vertical binning factor.
    pub y_binning: i32,
}

impl Roi {
    /// Unbinned region covering the whole sensor.
    pub fn full_sensor(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            x_binning: 1,
            y_binning: 1,
        }
    }

    /// Number of pixels read out after binning.
    pub fn binned_pixel_count(&self) -> u64 {
        let columns = ceil_div(self.width, self.x_binning);
        let rows = ceil_div(self.height, self.y_binning);
        columns * rows
    }
}

fn ceil_div(extent: i32, bin: i32) -> u64 {
    if extent <= 0 || bin <= 0 {
        return 0;
    }
    let (extent, bin) = (extent as u64, bin as u64);
    extent.div_ceil(bin)
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{} (bin {}x{})",
            self.width, self.height, self.x, self.y, self.x_binning, self.y_binning
        )
    }
}

/// Collection of readout regions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rois {
    /// Regions in device order; region 0 drives acquisition.
    pub regions: Vec<Roi>,
}

impl Rois {
    /// A single-region collection.
    pub fn single(roi: Roi) -> Self {
        Self { regions: vec![roi] }
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether there are no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Geometric limits the sensor places on ROIs.
#[derive(Debug, Clone, PartialEq)]
pub struct RoisConstraint {
    /// Legal left edges.
    pub x: RangeConstraint,
    /// Legal top edges.
    pub y: RangeConstraint,
    /// Legal widths; the maximum is the sensor width.
    pub width: RangeConstraint,
    /// Legal heights; the maximum is the sensor height.
    pub height: RangeConstraint,
    /// Most regions the device accepts at once.
    pub maximum_roi_count: usize,
}

impl RoisConstraint {
    /// Sensor width in pixels.
    pub fn total_width(&self) -> i64 {
        self.width.maximum as i64
    }

    /// Sensor height in pixels.
    pub fn total_height(&self) -> i64 {
        self.height.maximum as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binned_pixel_count_rounds_partial_bins_up() {
        let mut roi = Roi::full_sensor(10, 5);
        assert_eq!(roi.binned_pixel_count(), 50);
        roi.x_binning = 3;
        roi.y_binning = 2;
        assert_eq!(roi.binned_pixel_count(), 4 * 3);
    }

    #[test]
    fn degenerate_roi_has_no_pixels() {
        let roi = Roi::full_sensor(0, 512);
        assert_eq!(roi.binned_pixel_count(), 0);
    }

    #[test]
    fn totals_come_from_width_and_height_maxima() {
        let constraint = RoisConstraint {
            x: RangeConstraint::new(0.0, 1023.0, 1.0),
            y: RangeConstraint::new(0.0, 1023.0, 1.0),
            width: RangeConstraint::new(1.0, 1024.0, 1.0),
            height: RangeConstraint::new(1.0, 512.0, 1.0),
            maximum_roi_count: 1,
        };
        assert_eq!(constraint.total_width(), 1024);
        assert_eq!(constraint.total_height(), 512);
    }
}
