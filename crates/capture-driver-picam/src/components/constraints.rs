//! PICam Constraint Resolution
//!
//! Fetches a parameter's constraint from the device, copies it out, and
//! releases the vendor descriptor before returning. Constraints are never
//! cached: the legal range of one parameter can change when another is
//! committed.

use crate::components::release::ReleaseGuard;
use crate::error::ConstraintError;
use capture_core::{
    CameraDevice, ConstraintCategory, ConstraintDescriptor, ConstraintType, DeviceError,
    ParameterId, RoisConstraint,
};
use std::fmt;

/// Required and recommended constraints of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    /// Hard legality.
    pub required: ConstraintDescriptor,
    /// Advisory only; never used to reject a value.
    pub recommended: ConstraintDescriptor,
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "required {}, recommended {}",
            self.required, self.recommended
        )
    }
}

/// Stateless constraint queries against a device.
pub struct ConstraintResolver;

impl ConstraintResolver {
    /// Fetch one category of a parameter's constraint.
    ///
    /// Fails with `UnsupportedConstraintType` for anything but Range and Collection.
    pub fn get<D: CameraDevice + ?Sized>(
        device: &D,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> Result<ConstraintDescriptor, ConstraintError> {
        let constraint_type = device
            .constraint_type(parameter)
            .map_err(|source| ConstraintError::Fetch { parameter, source })?;
        Self::get_typed(device, parameter, constraint_type, category)
    }

    /// Fetch both categories. Each descriptor is released as soon as it is copied.
    pub fn fetch_both<D: CameraDevice + ?Sized>(
        device: &D,
        parameter: ParameterId,
    ) -> Result<ConstraintSet, ConstraintError> {
        let constraint_type = device
            .constraint_type(parameter)
            .map_err(|source| ConstraintError::Fetch { parameter, source })?;
        let required =
            Self::get_typed(device, parameter, constraint_type, ConstraintCategory::Required)?;
        let recommended = Self::get_typed(
            device,
            parameter,
            constraint_type,
            ConstraintCategory::Recommended,
        )?;
        tracing::debug!(%parameter, %required, %recommended, "Fetched constraints");
        Ok(ConstraintSet {
            required,
            recommended,
        })
    }

    /// Fetch the sensor's ROI constraint.
    pub fn rois<D: CameraDevice + ?Sized>(
        device: &D,
        category: ConstraintCategory,
    ) -> Result<RoisConstraint, DeviceError> {
        let constraint = ReleaseGuard::wrap(device, device.rois_constraint(category))?;
        Ok((*constraint).clone())
    }

    fn get_typed<D: CameraDevice + ?Sized>(
        device: &D,
        parameter: ParameterId,
        constraint_type: ConstraintType,
        category: ConstraintCategory,
    ) -> Result<ConstraintDescriptor, ConstraintError> {
        let fetch_error = |source| ConstraintError::Fetch { parameter, source };
        match constraint_type {
            ConstraintType::Range => {
                let range = ReleaseGuard::wrap(device, device.range_constraint(parameter, category))
                    .map_err(fetch_error)?;
                Ok(ConstraintDescriptor::Range(*range))
            }
            ConstraintType::Collection => {
                let collection = ReleaseGuard::wrap(
                    device,
                    device.collection_constraint(parameter, category),
                )
                .map_err(fetch_error)?;
                Ok(ConstraintDescriptor::Collection((*collection).clone()))
            }
            other => Err(ConstraintError::UnsupportedConstraintType {
                parameter,
                constraint_type: other,
            }),
        }
    }
}
