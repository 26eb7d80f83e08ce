//! Vendor-layer error type.
//!
//! Every call through [`crate::CameraDevice`] can fail independently (device
//! disconnected, parameter not present on this model, value rejected, I/O
//! failure inside the SDK). `DeviceError` gives each of those failures its own
//! variant and a stable numeric [`DeviceError::code`] so that callers can report
//! "print and continue" style failures without losing the cause.

use crate::device::ObjectId;
use crate::parameter::{ParameterId, ParameterValue, ValueKind};
use thiserror::Error;

/// Offset added to raw SDK codes by [`DeviceError::code`], keeping them clear
/// of the fixed codes below 100.
pub const SDK_CODE_BASE: i32 = 1000;

/// Result type alias for device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Errors reported by a camera backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No camera is connected.
    #[error("No camera found")]
    NotFound,

    /// The handle was already closed.
    #[error("Camera handle is not open")]
    NotOpen,

    /// The parameter does not exist on this camera model.
    #[error("Parameter {0} does not exist on this camera")]
    ParameterDoesNotExist(ParameterId),

    /// The value kind does not match the parameter's kind.
    #[error("Parameter {parameter} holds {expected} values, got {actual}")]
    InvalidParameterType {
        parameter: ParameterId,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// The parameter cannot be written.
    #[error("Parameter {0} is read-only")]
    ParameterIsReadOnly(ParameterId),

    /// The parameter cannot be read from hardware.
    #[error("Parameter {0} is not readable")]
    ParameterIsNotReadable(ParameterId),

    /// The value violates the parameter's required constraint.
    #[error("Value {value} is not valid for parameter {parameter}")]
    InvalidParameterValue {
        parameter: ParameterId,
        value: ParameterValue,
    },

    /// The parameter has no constraint of the requested shape.
    #[error("Parameter {0} has no constraint of the requested type")]
    InvalidConstraintType(ParameterId),

    /// The ROI descriptor violates the sensor's ROI constraint.
    #[error("Invalid ROI descriptor: {0}")]
    InvalidRois(String),

    /// The object id does not name an outstanding vendor allocation.
    #[error("Object {0} is not an outstanding vendor allocation")]
    InvalidObject(ObjectId),

    /// Acquisition could not be started or did not complete.
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// Communication with the camera was lost.
    #[error("Camera disconnected")]
    Disconnected,

    /// Raw SDK error that has no dedicated variant.
    #[error("SDK error {code}: {message}")]
    Sdk { code: i32, message: String },

    /// Failure injected by the simulated camera.
    #[error("Injected failure on operation '{operation}'")]
    Injected { operation: &'static str },
}

impl DeviceError {
    /// Stable numeric code for the failure, suitable for logs and exit statuses.
    ///
    /// Raw SDK errors map to `SDK_CODE_BASE + code`; the raw value stays in
    /// the `Sdk` variant.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::NotFound => 1,
            DeviceError::NotOpen => 2,
            DeviceError::ParameterDoesNotExist(_) => 3,
            DeviceError::InvalidParameterType { .. } => 4,
            DeviceError::ParameterIsReadOnly(_) => 5,
            DeviceError::ParameterIsNotReadable(_) => 6,
            DeviceError::InvalidParameterValue { .. } => 7,
            DeviceError::InvalidObject(_) => 8,
            DeviceError::AcquisitionFailed(_) => 9,
            DeviceError::Disconnected => 10,
            DeviceError::InvalidRois(_) => 11,
            DeviceError::InvalidConstraintType(_) => 12,
            DeviceError::Sdk { code, .. } => SDK_CODE_BASE.saturating_add(*code),
            DeviceError::Injected { .. } => 99,
        }
    }

    /// Check if this is a "no camera" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_for_fixed_variants() {
        let errors = [
            DeviceError::NotFound,
            DeviceError::NotOpen,
            DeviceError::ParameterDoesNotExist(ParameterId::ExposureTime),
            DeviceError::InvalidParameterType {
                parameter: ParameterId::ExposureTime,
                expected: ValueKind::FloatingPoint,
                actual: ValueKind::Integer,
            },
            DeviceError::ParameterIsReadOnly(ParameterId::ReadoutStride),
            DeviceError::ParameterIsNotReadable(ParameterId::Rois),
            DeviceError::InvalidParameterValue {
                parameter: ParameterId::ExposureTime,
                value: ParameterValue::Float(-1.0),
            },
            DeviceError::InvalidObject(ObjectId(4)),
            DeviceError::AcquisitionFailed("x".into()),
            DeviceError::Disconnected,
            DeviceError::InvalidRois("empty".into()),
            DeviceError::InvalidConstraintType(ParameterId::PixelBitDepth),
            DeviceError::Injected { operation: "get_value" },
        ];
        let mut codes: Vec<i32> = errors.iter().map(DeviceError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn sdk_codes_do_not_collide_with_fixed_codes() {
        let sdk = DeviceError::Sdk {
            code: 3,
            message: "parameter does not exist".into(),
        };
        assert_eq!(sdk.code(), SDK_CODE_BASE + 3);
        assert_ne!(
            sdk.code(),
            DeviceError::ParameterDoesNotExist(ParameterId::ExposureTime).code()
        );
        assert_eq!(sdk.to_string(), "SDK error 3: parameter does not exist");
    }

    #[test]
    fn display_names_the_parameter() {
        let err = DeviceError::InvalidParameterValue {
            parameter: ParameterId::ExposureTime,
            value: ParameterValue::Float(-5.0),
        };
        assert_eq!(
            err.to_string(),
            "Value -5 is not valid for parameter Exposure Time"
        );
    }
}
