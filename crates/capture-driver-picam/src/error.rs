//! Component error kinds.
//!
//! Each component reports its own failure taxonomy. Vendor failures are
//! carried as [`DeviceError`] so the original code stays attached.

use crate::components::roi::GeometryViolation;
use capture_core::{AcquisitionErrors, ConstraintType, DeviceError, ParameterId};
use std::path::PathBuf;
use thiserror::Error;

/// Opening a camera failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpenError {
    /// Neither a connected camera nor a demo camera could be opened.
    #[error("Failed to connect demo camera: {0}")]
    DemoConnect(#[source] DeviceError),

    /// The camera opened but its identity could not be read.
    #[error("Failed to read camera identity: {0}")]
    Identify(#[source] DeviceError),
}

/// Fetching a constraint failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    /// The device reports a constraint shape other than Range or Collection.
    #[error("Parameter {parameter} has unsupported constraint type {constraint_type}")]
    UnsupportedConstraintType {
        /// Parameter whose constraint was fetched.
        parameter: ParameterId,
        /// Shape the device reported.
        constraint_type: ConstraintType,
    },

    /// A device call made while fetching the constraint failed.
    #[error("Failed to fetch constraint for {parameter}: {source}")]
    Fetch {
        /// Parameter whose constraint was fetched.
        parameter: ParameterId,
        /// Underlying vendor failure.
        #[source]
        source: DeviceError,
    },
}

/// A recorded failure inside one commit attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// A device call failed.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Constraint resolution failed.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
}

impl StepError {
    /// Numeric code of the underlying vendor failure, if there is one.
    pub fn code(&self) -> Option<i32> {
        match self {
            StepError::Device(err) => Some(err.code()),
            StepError::Constraint(ConstraintError::Fetch { source, .. }) => Some(source.code()),
            StepError::Constraint(ConstraintError::UnsupportedConstraintType { .. }) => None,
        }
    }
}

/// A commit attempt aborted under the hard-stop policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    /// The set call failed.
    #[error("Failed to set {parameter}: {source}")]
    Set {
        /// Parameter whose set was attempted.
        parameter: ParameterId,
        /// Underlying vendor failure.
        #[source]
        source: DeviceError,
    },

    /// The commit-status query failed.
    #[error("Failed to query commit status after setting {parameter}: {source}")]
    StatusQuery {
        /// Parameter whose set was attempted.
        parameter: ParameterId,
        /// Underlying vendor failure.
        #[source]
        source: DeviceError,
    },

    /// The commit call failed.
    #[error("Commit after setting {parameter} failed: {source}")]
    CommitCall {
        /// Parameter whose set was attempted.
        parameter: ParameterId,
        /// Underlying vendor failure.
        #[source]
        source: DeviceError,
    },

    /// The commit returned rejected parameters.
    #[error("Commit after setting {parameter} rejected {}", join_parameters(.failed))]
    Rejected {
        /// Parameter whose set was attempted.
        parameter: ParameterId,
        /// Parameters the device refused.
        failed: Vec<ParameterId>,
    },
}

impl CommitError {
    /// Parameter whose set triggered the failure.
    pub fn parameter(&self) -> ParameterId {
        match self {
            CommitError::Set { parameter, .. }
            | CommitError::StatusQuery { parameter, .. }
            | CommitError::CommitCall { parameter, .. }
            | CommitError::Rejected { parameter, .. } => *parameter,
        }
    }
}

/// The configuration sequence stopped early.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    /// A step failed under hard-stop.
    #[error("Configuration sequence aborted at step {step}: {source}")]
    Aborted {
        /// Zero-based index of the failing step.
        step: usize,
        /// Failure of that step.
        #[source]
        source: CommitError,
    },
}

/// Reading the sensor temperature failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemperatureError {
    /// The temperature read failed.
    #[error("Failed to read sensor temperature: {0}")]
    Reading(#[source] DeviceError),

    /// The status read failed.
    #[error("Failed to read sensor temperature status: {0}")]
    Status(#[source] DeviceError),
}

/// Why an acquisition produced no usable data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionFailure {
    /// The readout stride could not be read.
    #[error("readout stride unavailable: {0}")]
    Stride(#[source] DeviceError),

    /// The device reported a stride of zero or less.
    #[error("invalid readout stride {0}")]
    InvalidStride(i64),

    /// The acquire call failed.
    #[error("{0}")]
    Device(#[source] DeviceError),

    /// The device returned data with a non-empty error mask.
    #[error("device reported acquisition errors {0:?}")]
    Errors(AcquisitionErrors),

    /// Fewer bytes than `frames × stride` came back.
    #[error("buffer holds {actual} bytes, expected {expected}")]
    ShortBuffer {
        /// `frames × stride`
        expected: usize,
        /// Bytes returned.
        actual: usize,
    },
}

/// ROI acquisition failed.
#[derive(Error, Debug)]
pub enum RoiError {
    /// The ROI constraint could not be fetched.
    #[error("Failed to fetch ROI constraint: {0}")]
    ConstraintFetchFailed(#[source] DeviceError),

    /// The request does not fit the sensor. Lists every violated condition.
    #[error("Invalid ROI geometry: {}", join_violations(.violations))]
    InvalidGeometry {
        /// Violated conditions, in check order.
        violations: Vec<GeometryViolation>,
    },

    /// Reading or writing the ROI parameter failed.
    #[error("Failed to update ROI: {0}")]
    RoiUpdateFailed(#[source] DeviceError),

    /// The ROI commit rejected parameters under hard-stop.
    #[error("Commit rejected {}", join_parameters(.failed))]
    CommitFailed {
        /// Parameters the device refused.
        failed: Vec<ParameterId>,
    },

    /// The ROI commit call failed.
    #[error("Commit failed: {0}")]
    CommitCallFailed(#[source] DeviceError),

    /// Acquisition produced no usable data.
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(#[source] AcquisitionFailure),

    /// The frame file could not be created or written.
    #[error("Failed to write {}: {source}", .path.display())]
    OutputWriteFailed {
        /// Output file.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },
}

fn join_parameters(parameters: &[ParameterId]) -> String {
    parameters
        .iter()
        .map(ParameterId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_violations(violations: &[GeometryViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_lists_every_parameter() {
        let err = CommitError::Rejected {
            parameter: ParameterId::CleanSectionFinalHeight,
            failed: vec![
                ParameterId::CleanSectionFinalHeight,
                ParameterId::CleanSectionFinalHeightCount,
            ],
        };
        assert_eq!(
            err.to_string(),
            "Commit after setting Clean Section Final Height rejected \
             Clean Section Final Height, Clean Section Final Height Count"
        );
        assert_eq!(err.parameter(), ParameterId::CleanSectionFinalHeight);
    }

    #[test]
    fn step_error_exposes_vendor_code() {
        let err = StepError::from(DeviceError::NotOpen);
        assert_eq!(err.code(), Some(2));
        let err = StepError::from(ConstraintError::UnsupportedConstraintType {
            parameter: ParameterId::Rois,
            constraint_type: ConstraintType::Rois,
        });
        assert_eq!(err.code(), None);
    }

    #[test]
    fn geometry_error_itemizes_violations() {
        let err = RoiError::InvalidGeometry {
            violations: vec![
                GeometryViolation::XNegative { x0: -1 },
                GeometryViolation::HeightTooSmall { height: 0 },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid ROI geometry: x0 (-1) must be >= 0; height (0) must be >= 1"
        );
    }
}
