//! The device collaborator.
//!
//! [`CameraDevice`] is the fixed set of operations the camera components need
//! from a vendor SDK (or from the simulated camera). It mirrors the SDK's shape
//! closely on purpose:
//!
//! - values are *staged* by `set_value`/`set_rois` and only reach hardware on
//!   `commit_parameters`
//! - constraint descriptors, ROI descriptors and failed-parameter lists are
//!   vendor allocations returned as [`VendorObject`]s, each of which must be
//!   handed back through [`CameraDevice::release`] exactly once
//! - `read_live_value` bypasses staging and reads hardware directly
//!
//! Methods take `&self`. Implementations serialize access to the underlying
//! handle internally; callers never issue two device calls concurrently.

use crate::constraint::{CollectionConstraint, ConstraintCategory, ConstraintType, RangeConstraint};
use crate::error::DeviceResult;
use crate::parameter::{ParameterId, ParameterValue};
use crate::roi::{Rois, RoisConstraint};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Camera Identity
// =============================================================================

/// Camera model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraModel {
    /// PIXIS: 100F
    Pixis100F,
    /// PIXIS: 400BR
    Pixis400BR,
    /// PIXIS: 1024B
    Pixis1024B,
    /// PIXIS: 1024BR, the default demo model.
    Pixis1024BR,
    /// PIXIS: 2048B
    Pixis2048B,
    /// ProEM: 512B
    ProEM512B,
    /// PyLoN: 400BR
    Pylon400BR,
    /// SOPHIA: 2048B
    Sophia2048B,
    /// Model code this crate has no name for.
    Unknown(i32),
}

impl fmt::Display for CameraModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraModel::Pixis100F => f.write_str("PIXIS: 100F"),
            CameraModel::Pixis400BR => f.write_str("PIXIS: 400BR"),
            CameraModel::Pixis1024B => f.write_str("PIXIS: 1024B"),
            CameraModel::Pixis1024BR => f.write_str("PIXIS: 1024BR"),
            CameraModel::Pixis2048B => f.write_str("PIXIS: 2048B"),
            CameraModel::ProEM512B => f.write_str("ProEM: 512B"),
            CameraModel::Pylon400BR => f.write_str("PyLoN: 400BR"),
            CameraModel::Sophia2048B => f.write_str("SOPHIA: 2048B"),
            CameraModel::Unknown(code) => write!(f, "Unknown model ({})", code),
        }
    }
}

/// Identity of an opened camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraId {
    /// Camera model.
    pub model: CameraModel,
    /// Serial number as reported by the device.
    pub serial_number: String,
    /// Sensor name.
    pub sensor_name: String,
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (SN:{}) [{}]",
            self.model, self.serial_number, self.sensor_name
        )
    }
}

// =============================================================================
// Vendor Allocations
// =============================================================================

/// Identifier of an outstanding vendor allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value backed by a vendor allocation that must be released.
#[derive(Debug)]
#[must_use = "vendor objects must be released through CameraDevice::release"]
pub struct VendorObject<T> {
    /// Allocation to release.
    pub id: ObjectId,
    /// Contents copied out of the allocation.
    pub value: T,
}

impl<T> VendorObject<T> {
    /// Wrap `value` backed by allocation `id`.
    pub fn new(id: ObjectId, value: T) -> Self {
        Self { id, value }
    }
}

// =============================================================================
// Acquisition
// =============================================================================

/// Timeout for a blocking acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireTimeout {
    /// Block until every readout arrives or the device reports an error.
    #[default]
    Infinite,
    /// Give up after this many milliseconds.
    Millis(u32),
}

bitflags! {
    /// Errors the device reports alongside acquired data.
    ///
    /// Backends build the mask with `from_bits_retain`: a bit this crate has
    /// no name for still makes the mask non-empty.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AcquisitionErrors: u32 {
        /// Readouts were dropped.
        const DATA_LOST = 0x1;
        /// The camera disconnected mid-acquisition.
        const CONNECTION_LOST = 0x2;
        /// Readouts stopped arriving.
        const DATA_NOT_ARRIVING = 0x4;
        /// The shutter overheated.
        const SHUTTER_OVERHEATED = 0x8;
        /// The camera entered a fault state.
        const CAMERA_FAULTED = 0x10;
    }
}

/// Data produced by one acquisition.
///
/// The SDK buffer only lives until the next acquisition or until the camera is
/// closed, so backends copy it out before returning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcquiredData {
    /// Number of readouts actually captured.
    pub readout_count: u64,
    /// Bytes per readout.
    pub readout_stride: usize,
    /// Readouts, concatenated in acquisition order.
    pub bytes: Vec<u8>,
    /// Errors reported with the data. Empty on a clean acquisition.
    pub errors: AcquisitionErrors,
}

impl AcquiredData {
    /// Bytes starting at the first readout.
    pub fn initial_readout(&self) -> &[u8] {
        &self.bytes
    }
}

// =============================================================================
// Device Traits
// =============================================================================

/// Operations the camera components require from a backend.
pub trait CameraDevice {
    /// Identity of the opened camera.
    fn camera_id(&self) -> DeviceResult<CameraId>;

    /// Current value, including a staged (uncommitted) change.
    fn get_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue>;

    fn get_default_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue>;

    /// Stage a new value.
    fn set_value(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<()>;

    fn can_read(&self, parameter: ParameterId) -> DeviceResult<bool>;

    fn can_set(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<bool>;

    fn constraint_type(&self, parameter: ParameterId) -> DeviceResult<ConstraintType>;

    fn range_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RangeConstraint>>;

    fn collection_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<CollectionConstraint>>;

    fn rois_constraint(
        &self,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RoisConstraint>>;

    /// Current ROI descriptor, including a staged change.
    fn current_rois(&self) -> DeviceResult<VendorObject<Rois>>;

    /// Stage a new ROI descriptor.
    fn set_rois(&self, rois: &Rois) -> DeviceResult<()>;

    /// `true` when no staged change is pending.
    fn are_parameters_committed(&self) -> DeviceResult<bool>;

    /// Push every staged value to hardware. The returned list names the
    /// parameters that failed validation; they keep their prior values.
    fn commit_parameters(&self) -> DeviceResult<VendorObject<Vec<ParameterId>>>;

    /// Read a value directly from hardware, bypassing staging.
    fn read_live_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue>;

    /// Acquire `readout_count` readouts with the committed configuration.
    fn acquire(&self, readout_count: u64, timeout: AcquireTimeout) -> DeviceResult<AcquiredData>;

    /// Release a vendor allocation.
    fn release(&self, object: ObjectId) -> DeviceResult<()>;

    /// Close the camera. Further calls fail with `NotOpen`.
    fn close(&self) -> DeviceResult<()>;
}

/// Entry point of a backend: opens cameras.
pub trait CameraLibrary {
    type Device: CameraDevice;

    /// Open the first connected camera, or fail with `DeviceError::NotFound`.
    fn open_first(&self) -> DeviceResult<Self::Device>;

    /// Create and open a simulated camera of the given model.
    fn connect_demo(&self, model: CameraModel, serial_number: &str) -> DeviceResult<Self::Device>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_id_prints_model_serial_and_sensor() {
        let id = CameraId {
            model: CameraModel::Pixis1024BR,
            serial_number: "12345".into(),
            sensor_name: "E2V 1024 x 1024 (CCD 47-10)(B)".into(),
        };
        assert_eq!(
            id.to_string(),
            "PIXIS: 1024BR (SN:12345) [E2V 1024 x 1024 (CCD 47-10)(B)]"
        );
    }

    #[test]
    fn acquisition_error_mask_combines() {
        let mask = AcquisitionErrors::DATA_LOST | AcquisitionErrors::CONNECTION_LOST;
        assert_eq!(mask.bits(), 0x3);
        assert!(AcquisitionErrors::default().is_empty());
    }

    #[test]
    fn device_masks_are_never_emptied() {
        for bits in [0x4, 0x8, 0x10, 0x40] {
            let mask = AcquisitionErrors::from_bits_retain(bits);
            assert!(!mask.is_empty(), "mask {:#x} lost its bits", bits);
            assert_eq!(mask.bits(), bits);
        }
        assert!(AcquisitionErrors::from_bits_retain(0x4)
            .contains(AcquisitionErrors::DATA_NOT_ARRIVING));
    }

    #[test]
    fn default_timeout_is_infinite() {
        assert_eq!(AcquireTimeout::default(), AcquireTimeout::Infinite);
    }
}
