//! ROI Acquisition Pipeline
//!
//! Reads a sub-region of the sensor for a number of frames and writes the
//! frames to disk as one flat binary file (`frames × readout stride` bytes,
//! no header).
//!
//! ## Flow
//!
//! 1. Fetch the required ROI constraint to learn the sensor size
//! 2. Validate the requested geometry, reporting every violated condition
//! 3. Overwrite region 0 of the current ROI (binning 1×1), write it back, commit
//! 4. Read the readout stride (required) and readout time (informational)
//! 5. Acquire with no timeout
//! 6. Write exactly `frames × stride` bytes from the first readout
//!
//! Every step is a hard stop for this acquisition. Whether a non-empty
//! rejected list after the ROI commit also stops it is set by the
//! [`CommitPolicy`] passed in.
//!
//! Only region 0 is updated; additional regions reported by the device are
//! left untouched.

use crate::components::commit::CommitEngine;
use crate::components::constraints::ConstraintResolver;
use crate::components::release::ReleaseGuard;
use crate::error::{AcquisitionFailure, RoiError};
use capture_core::{
    AcquireTimeout, CameraDevice, CommitPolicy, ConstraintCategory, DeviceError, ParameterId,
    ParameterValue, Roi,
};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A requested readout region and frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiRequest {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
    /// Frames to acquire.
    pub frame_count: u64,
}

impl RoiRequest {
    /// Every condition this request violates on a `total_width × total_height` sensor.
    pub fn violations(&self, total_width: i64, total_height: i64) -> Vec<GeometryViolation> {
        let (x0, y0) = (i64::from(self.x0), i64::from(self.y0));
        let (width, height) = (i64::from(self.width), i64::from(self.height));
        let mut violations = Vec::new();

        if x0 < 0 {
            violations.push(GeometryViolation::XNegative { x0: self.x0 });
        }
        if x0 >= total_width {
            violations.push(GeometryViolation::XBeyondSensor {
                x0: self.x0,
                total_width,
            });
        }
        if y0 < 0 {
            violations.push(GeometryViolation::YNegative { y0: self.y0 });
        }
        if y0 >= total_height {
            violations.push(GeometryViolation::YBeyondSensor {
                y0: self.y0,
                total_height,
            });
        }
        if width < 1 {
            violations.push(GeometryViolation::WidthTooSmall { width: self.width });
        }
        if height < 1 {
            violations.push(GeometryViolation::HeightTooSmall {
                height: self.height,
            });
        }
        if x0 + width > total_width {
            violations.push(GeometryViolation::RightEdgeBeyondSensor {
                x0: self.x0,
                width: self.width,
                total_width,
            });
        }
        if y0 + height > total_height {
            violations.push(GeometryViolation::BottomEdgeBeyondSensor {
                y0: self.y0,
                height: self.height,
                total_height,
            });
        }
        violations
    }

    fn to_roi(self) -> Roi {
        Roi {
            x: self.x0,
            y: self.y0,
            width: self.width,
            height: self.height,
            x_binning: 1,
            y_binning: 1,
        }
    }
}

/// One violated geometry condition.
///
/// Fields carry the requested values and the sensor size they were checked
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum GeometryViolation {
    /// `x0 < 0`
    XNegative { x0: i32 },
    /// `x0 >= total_width`
    XBeyondSensor { x0: i32, total_width: i64 },
    /// `y0 < 0`
    YNegative { y0: i32 },
    /// `y0 >= total_height`
    YBeyondSensor { y0: i32, total_height: i64 },
    /// `width < 1`
    WidthTooSmall { width: i32 },
    /// `height < 1`
    HeightTooSmall { height: i32 },
    /// `x0 + width > total_width`
    RightEdgeBeyondSensor { x0: i32, width: i32, total_width: i64 },
    /// `y0 + height > total_height`
    BottomEdgeBeyondSensor { y0: i32, height: i32, total_height: i64 },
}

impl fmt::Display for GeometryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            GeometryViolation::XNegative { x0 } => write!(f, "x0 ({}) must be >= 0", x0),
            GeometryViolation::XBeyondSensor { x0, total_width } => {
                write!(f, "x0 ({}) must be < sensor width ({})", x0, total_width)
            }
            GeometryViolation::YNegative { y0 } => write!(f, "y0 ({}) must be >= 0", y0),
            GeometryViolation::YBeyondSensor { y0, total_height } => {
                write!(f, "y0 ({}) must be < sensor height ({})", y0, total_height)
            }
            GeometryViolation::WidthTooSmall { width } => {
                write!(f, "width ({}) must be >= 1", width)
            }
            GeometryViolation::HeightTooSmall { height } => {
                write!(f, "height ({}) must be >= 1", height)
            }
            GeometryViolation::RightEdgeBeyondSensor {
                x0,
                width,
                total_width,
            } => write!(
                f,
                "x0 + width ({}) must be <= sensor width ({})",
                i64::from(x0) + i64::from(width),
                total_width
            ),
            GeometryViolation::BottomEdgeBeyondSensor {
                y0,
                height,
                total_height,
            } => write!(
                f,
                "y0 + height ({}) must be <= sensor height ({})",
                i64::from(y0) + i64::from(height),
                total_height
            ),
        }
    }
}

/// What a successful acquisition produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSummary {
    /// File the frames were written to.
    pub output: PathBuf,
    /// Region written to the device. Under best-effort it may have been rejected.
    pub roi: Roi,
    /// Frames written.
    pub frame_count: u64,
    /// Bytes per frame.
    pub readout_stride: usize,
    /// Estimated readout time per frame in milliseconds, if the device reported it.
    pub readout_time_ms: Option<f64>,
    /// Bits per pixel, if the device reported it.
    pub pixel_bit_depth: Option<i32>,
    /// Always `frame_count * readout_stride`.
    pub bytes_written: usize,
    /// Parameters rejected by the ROI commit (best-effort only).
    pub rejected: Vec<ParameterId>,
}

/// Validates, configures and acquires a single ROI.
pub struct RoiPipeline;

impl RoiPipeline {
    /// Acquire `request.frame_count` frames of the requested region into `output`.
    pub fn acquire<D: CameraDevice + ?Sized>(
        device: &D,
        output: &Path,
        request: &RoiRequest,
        policy: CommitPolicy,
    ) -> Result<AcquisitionSummary, RoiError> {
        let constraint = ConstraintResolver::rois(device, ConstraintCategory::Required)
            .map_err(RoiError::ConstraintFetchFailed)?;
        let (total_width, total_height) = (constraint.total_width(), constraint.total_height());

        let violations = request.violations(total_width, total_height);
        if !violations.is_empty() {
            for violation in &violations {
                tracing::error!(%violation, "Invalid ROI geometry");
            }
            return Err(RoiError::InvalidGeometry { violations });
        }

        let (roi, rejected) = Self::configure_region(device, request, policy)?;

        let readout_stride = Self::readout_stride(device).map_err(RoiError::AcquisitionFailed)?;
        let readout_time_ms = match device.get_value(ParameterId::ReadoutTimeCalculation) {
            Ok(value) => Some(value.as_f64()),
            Err(e) => {
                tracing::warn!(code = e.code(), "Failed to read readout time: {}", e);
                None
            }
        };
        tracing::info!(
            %roi,
            readout_stride,
            readout_time_ms,
            frames = request.frame_count,
            "Starting acquisition"
        );

        let data = device
            .acquire(request.frame_count, AcquireTimeout::Infinite)
            .map_err(|e| RoiError::AcquisitionFailed(AcquisitionFailure::Device(e)))?;
        if !data.errors.is_empty() {
            return Err(RoiError::AcquisitionFailed(AcquisitionFailure::Errors(
                data.errors,
            )));
        }
        let expected = usize::try_from(request.frame_count)
            .ok()
            .and_then(|frames| frames.checked_mul(readout_stride))
            .unwrap_or(usize::MAX);
        let frames = data.initial_readout();
        if frames.len() < expected {
            return Err(RoiError::AcquisitionFailed(AcquisitionFailure::ShortBuffer {
                expected,
                actual: frames.len(),
            }));
        }

        let pixel_bit_depth = match device.get_value(ParameterId::PixelBitDepth) {
            Ok(ParameterValue::Integer(depth)) => Some(depth),
            Ok(ParameterValue::Float(depth)) => Some(depth as i32),
            Err(e) => {
                tracing::warn!(code = e.code(), "Failed to read pixel bit depth: {}", e);
                None
            }
        };

        Self::write_frames(output, &frames[..expected])?;
        tracing::info!(
            path = %output.display(),
            bytes = expected,
            pixel_bit_depth,
            "Frames written"
        );

        Ok(AcquisitionSummary {
            output: output.to_path_buf(),
            roi,
            frame_count: request.frame_count,
            readout_stride,
            readout_time_ms,
            pixel_bit_depth,
            bytes_written: expected,
            rejected,
        })
    }

    /// Update region 0, write it back and commit. The descriptor is released on
    /// every path out of this function.
    fn configure_region<D: CameraDevice + ?Sized>(
        device: &D,
        request: &RoiRequest,
        policy: CommitPolicy,
    ) -> Result<(Roi, Vec<ParameterId>), RoiError> {
        let mut rois = ReleaseGuard::wrap(device, device.current_rois())
            .map_err(RoiError::RoiUpdateFailed)?;
        if rois.len() > 1 {
            tracing::warn!(regions = rois.len(), "Only region 0 is updated");
        }
        let roi = request.to_roi();
        match rois.regions.first_mut() {
            Some(region) => *region = roi,
            None => {
                return Err(RoiError::RoiUpdateFailed(DeviceError::InvalidRois(
                    "device reported no regions".to_string(),
                )))
            }
        }
        device.set_rois(&rois).map_err(RoiError::RoiUpdateFailed)?;

        let rejected = CommitEngine::commit(device).map_err(RoiError::CommitCallFailed)?;
        if !rejected.is_empty() {
            for parameter in &rejected {
                tracing::warn!(%parameter, "Parameter rejected by ROI commit");
            }
            if policy == CommitPolicy::HardStop {
                return Err(RoiError::CommitFailed { failed: rejected });
            }
        }
        Ok((roi, rejected))
    }

    fn readout_stride<D: CameraDevice + ?Sized>(device: &D) -> Result<usize, AcquisitionFailure> {
        let stride = device
            .get_value(ParameterId::ReadoutStride)
            .map_err(AcquisitionFailure::Stride)?;
        let stride = match stride {
            ParameterValue::Integer(bytes) => i64::from(bytes),
            ParameterValue::Float(bytes) => bytes as i64,
        };
        match usize::try_from(stride) {
            Ok(bytes) if bytes > 0 => Ok(bytes),
            _ => Err(AcquisitionFailure::InvalidStride(stride)),
        }
    }

    fn write_frames(output: &Path, frames: &[u8]) -> Result<(), RoiError> {
        let write_error = |source| RoiError::OutputWriteFailed {
            path: output.to_path_buf(),
            source,
        };
        let file = File::create(output).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(frames).map_err(write_error)?;
        writer.flush().map_err(write_error)
    }
}
