//! PICam SDK backend.
//!
//! ## Library Reference Counting
//!
//! `Picam_InitializeLibrary` / `Picam_UninitializeLibrary` act on process-wide
//! state. Every [`PicamLibrary`] and every camera opened from it holds a
//! [`LibraryRef`]; the SDK is initialized when the first one is created and
//! uninitialized when the last one is dropped.
//!
//! ## Vendor Allocations
//!
//! Constraint, ROI and failed-parameter arrays returned by the SDK are copied
//! into owned values and the raw pointer is parked in a table under a fresh
//! [`ObjectId`]. `release` hands the pointer to the matching `Picam_Destroy*`
//! call. Anything still parked when the camera is dropped is destroyed then.

#![allow(unsafe_code)]

use capture_core::{
    AcquireTimeout, AcquiredData, AcquisitionErrors, CameraDevice, CameraId, CameraLibrary,
    CameraModel, CollectionConstraint, ConstraintCategory, ConstraintType, DeviceError,
    DeviceResult, ObjectId, ParameterId, ParameterValue, RangeConstraint, Roi, Rois,
    RoisConstraint, ValueKind, VendorObject,
};
use parking_lot::Mutex;
use picam_sys::*;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

/// Number of live [`LibraryRef`]s.
static LIBRARY_USERS: Mutex<u32> = Mutex::new(0);

/// Keeps the SDK initialized while alive.
struct LibraryRef;

impl LibraryRef {
    fn acquire() -> DeviceResult<Self> {
        let mut users = LIBRARY_USERS.lock();
        if *users == 0 {
            // SAFETY: global init, serialized by LIBRARY_USERS.
            check(unsafe { Picam_InitializeLibrary() })?;
            tracing::info!("PICam library initialized");
        }
        *users += 1;
        tracing::debug!(users = *users, "PICam library reference acquired");
        Ok(LibraryRef)
    }
}

impl Drop for LibraryRef {
    fn drop(&mut self) {
        let mut users = LIBRARY_USERS.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            // SAFETY: last user; no camera handles remain open.
            let err = unsafe { Picam_UninitializeLibrary() };
            if err != PicamError_None {
                tracing::warn!("Failed to uninitialize PICam library: {}", sdk_error(err));
            } else {
                tracing::info!("PICam library uninitialized");
            }
        }
    }
}

// =============================================================================
// Error and Enumeration Helpers
// =============================================================================

fn enumeration_string(kind: PicamEnumeratedType, value: i32) -> Option<String> {
    let mut text: *const c_char = ptr::null();
    // SAFETY: text is a valid out pointer; the string is destroyed below.
    let err = unsafe { Picam_GetEnumerationString(kind, value as _, &mut text) };
    if err != PicamError_None || text.is_null() {
        return None;
    }
    // SAFETY: the SDK returned a NUL-terminated string it owns until destroyed.
    let owned = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    // SAFETY: text came from Picam_GetEnumerationString.
    unsafe { Picam_DestroyString(text) };
    Some(owned)
}

fn sdk_error(err: PicamError) -> DeviceError {
    if err == PicamError_NoCamerasAvailable {
        return DeviceError::NotFound;
    }
    let code = err as i32;
    DeviceError::Sdk {
        code,
        message: enumeration_string(PicamEnumeratedType_Error, code)
            .unwrap_or_else(|| format!("PICam error {}", code)),
    }
}

fn check(err: PicamError) -> DeviceResult<()> {
    if err == PicamError_None {
        Ok(())
    } else {
        Err(sdk_error(err))
    }
}

/// Whether a `Picam_CommitParameters` result carries a usable failed list.
///
/// A partial rejection comes back as `InvalidParameterValues` with the
/// rejected parameters filled in; that is an outcome, not a failed call.
fn commit_reports_rejections(err: PicamError, failed_count: piint) -> bool {
    err == PicamError_None || (err == PicamError_InvalidParameterValues && failed_count > 0)
}

fn picam_parameter(parameter: ParameterId) -> PicamParameter {
    match parameter {
        ParameterId::ExposureTime => PicamParameter_ExposureTime,
        ParameterId::AdcSpeed => PicamParameter_AdcSpeed,
        ParameterId::AdcAnalogGain => PicamParameter_AdcAnalogGain,
        ParameterId::CleanUntilTrigger => PicamParameter_CleanUntilTrigger,
        ParameterId::TriggerResponse => PicamParameter_TriggerResponse,
        ParameterId::TriggerDetermination => PicamParameter_TriggerDetermination,
        ParameterId::CleanCycleCount => PicamParameter_CleanCycleCount,
        ParameterId::CleanCycleHeight => PicamParameter_CleanCycleHeight,
        ParameterId::CleanSectionFinalHeight => PicamParameter_CleanSectionFinalHeight,
        ParameterId::CleanSectionFinalHeightCount => PicamParameter_CleanSectionFinalHeightCount,
        ParameterId::SensorTemperatureSetPoint => PicamParameter_SensorTemperatureSetPoint,
        ParameterId::SensorTemperatureReading => PicamParameter_SensorTemperatureReading,
        ParameterId::SensorTemperatureStatus => PicamParameter_SensorTemperatureStatus,
        ParameterId::ReadoutControlMode => PicamParameter_ReadoutControlMode,
        ParameterId::ReadoutStride => PicamParameter_ReadoutStride,
        ParameterId::ReadoutTimeCalculation => PicamParameter_ReadoutTimeCalculation,
        ParameterId::PixelBitDepth => PicamParameter_PixelBitDepth,
        ParameterId::Rois => PicamParameter_Rois,
    }
}

fn parameter_id(parameter: PicamParameter) -> Option<ParameterId> {
    ParameterId::ALL
        .into_iter()
        .find(|id| picam_parameter(*id) == parameter)
}

fn picam_model(model: CameraModel) -> PicamModel {
    match model {
        CameraModel::Pixis100F => PicamModel_Pixis100F,
        CameraModel::Pixis400BR => PicamModel_Pixis400BR,
        CameraModel::Pixis1024B => PicamModel_Pixis1024B,
        CameraModel::Pixis1024BR => PicamModel_Pixis1024BR,
        CameraModel::Pixis2048B => PicamModel_Pixis2048B,
        CameraModel::ProEM512B => PicamModel_ProEM512B,
        CameraModel::Pylon400BR => PicamModel_Pylon400BR,
        CameraModel::Sophia2048B => PicamModel_Sophia2048B,
        CameraModel::Unknown(code) => code as _,
    }
}

fn camera_model(model: PicamModel) -> CameraModel {
    const KNOWN: [CameraModel; 8] = [
        CameraModel::Pixis100F,
        CameraModel::Pixis400BR,
        CameraModel::Pixis1024B,
        CameraModel::Pixis1024BR,
        CameraModel::Pixis2048B,
        CameraModel::ProEM512B,
        CameraModel::Pylon400BR,
        CameraModel::Sophia2048B,
    ];
    KNOWN
        .into_iter()
        .find(|known| picam_model(*known) == model)
        .unwrap_or(CameraModel::Unknown(model as i32))
}

fn picam_category(category: ConstraintCategory) -> PicamConstraintCategory {
    match category {
        ConstraintCategory::Required => PicamConstraintCategory_Required,
        ConstraintCategory::Recommended => PicamConstraintCategory_Recommended,
    }
}

fn c_string(chars: &[c_char]) -> String {
    // SAFETY: the SDK NUL-terminates fixed-size string fields.
    unsafe { CStr::from_ptr(chars.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn range_constraint(raw: &PicamRangeConstraint) -> RangeConstraint {
    RangeConstraint::new(raw.minimum, raw.maximum, raw.increment)
}

fn is_true(flag: pibln) -> bool {
    flag != 0
}

// =============================================================================
// Camera
// =============================================================================

enum Allocation {
    Range(*const PicamRangeConstraint),
    Collection(*const PicamCollectionConstraint),
    RoisConstraint(*const PicamRoisConstraint),
    Rois(*const PicamRois),
    Parameters(*const PicamParameter),
}

impl Allocation {
    /// # Safety
    ///
    /// The pointer must come from the matching `Picam_Get*` call and must not
    /// have been destroyed yet.
    unsafe fn destroy(self) -> PicamError {
        match self {
            Allocation::Range(p) => Picam_DestroyRangeConstraints(p),
            Allocation::Collection(p) => Picam_DestroyCollectionConstraints(p),
            Allocation::RoisConstraint(p) => Picam_DestroyRoisConstraints(p),
            Allocation::Rois(p) => Picam_DestroyRois(p),
            Allocation::Parameters(p) => Picam_DestroyParameters(p),
        }
    }
}

struct CameraState {
    handle: PicamHandle,
    open: bool,
    allocations: HashMap<ObjectId, Allocation>,
    next_object_id: u64,
}

// SAFETY: the handle and parked pointers are only used behind the camera's
// mutex, which satisfies the SDK's exclusive-use contract.
unsafe impl Send for CameraState {}

impl CameraState {
    fn handle(&self) -> DeviceResult<PicamHandle> {
        if self.open {
            Ok(self.handle)
        } else {
            Err(DeviceError::NotOpen)
        }
    }

    fn park(&mut self, allocation: Allocation) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        self.allocations.insert(id, allocation);
        id
    }

    fn get_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let handle = self.handle()?;
        let raw = picam_parameter(parameter);
        match parameter.value_kind() {
            ValueKind::FloatingPoint => {
                let mut value: piflt = 0.0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe { Picam_GetParameterFloatingPointValue(handle, raw, &mut value) })?;
                Ok(ParameterValue::Float(value))
            }
            ValueKind::Integer => {
                let mut value: piint = 0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe { Picam_GetParameterIntegerValue(handle, raw, &mut value) })?;
                Ok(ParameterValue::Integer(value))
            }
            ValueKind::Rois => Err(rois_kind_error(parameter)),
        }
    }
}

fn rois_kind_error(parameter: ParameterId) -> DeviceError {
    DeviceError::InvalidParameterType {
        parameter,
        expected: ValueKind::Rois,
        actual: ValueKind::Integer,
    }
}

fn kind_mismatch(parameter: ParameterId, value: ParameterValue) -> DeviceError {
    DeviceError::InvalidParameterType {
        parameter,
        expected: parameter.value_kind(),
        actual: value.kind(),
    }
}

/// A camera opened through the PICam SDK.
pub struct PicamCamera {
    state: Mutex<CameraState>,
    _library: LibraryRef,
}

impl PicamCamera {
    fn new(handle: PicamHandle, library: LibraryRef) -> Self {
        Self {
            state: Mutex::new(CameraState {
                handle,
                open: true,
                allocations: HashMap::new(),
                next_object_id: 1,
            }),
            _library: library,
        }
    }
}

impl CameraDevice for PicamCamera {
    fn camera_id(&self) -> DeviceResult<CameraId> {
        let state = self.state.lock();
        let handle = state.handle()?;
        // SAFETY: PicamCameraID is plain data; all-zero is a valid value.
        let mut id: PicamCameraID = unsafe { std::mem::zeroed() };
        // SAFETY: open handle; id is a valid out pointer.
        check(unsafe { Picam_GetCameraID(handle, &mut id) })?;
        Ok(CameraId {
            model: camera_model(id.model),
            serial_number: c_string(&id.serial_number),
            sensor_name: c_string(&id.sensor_name),
        })
    }

    fn get_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        self.state.lock().get_value(parameter)
    }

    fn get_default_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let raw = picam_parameter(parameter);
        match parameter.value_kind() {
            ValueKind::FloatingPoint => {
                let mut value: piflt = 0.0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe {
                    Picam_GetParameterFloatingPointDefaultValue(handle, raw, &mut value)
                })?;
                Ok(ParameterValue::Float(value))
            }
            ValueKind::Integer => {
                let mut value: piint = 0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe { Picam_GetParameterIntegerDefaultValue(handle, raw, &mut value) })?;
                Ok(ParameterValue::Integer(value))
            }
            ValueKind::Rois => Err(rois_kind_error(parameter)),
        }
    }

    fn set_value(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<()> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let raw = picam_parameter(parameter);
        let err = match (parameter.value_kind(), value) {
            // SAFETY: open handle.
            (ValueKind::FloatingPoint, ParameterValue::Float(v)) => unsafe {
                Picam_SetParameterFloatingPointValue(handle, raw, v)
            },
            // SAFETY: open handle.
            (ValueKind::Integer, ParameterValue::Integer(v)) => unsafe {
                Picam_SetParameterIntegerValue(handle, raw, v)
            },
            _ => return Err(kind_mismatch(parameter, value)),
        };
        check(err)
    }

    fn can_read(&self, parameter: ParameterId) -> DeviceResult<bool> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let mut readable: pibln = 0;
        // SAFETY: open handle; readable is a valid out pointer.
        check(unsafe { Picam_CanReadParameter(handle, picam_parameter(parameter), &mut readable) })?;
        Ok(is_true(readable))
    }

    fn can_set(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<bool> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let raw = picam_parameter(parameter);
        let mut settable: pibln = 0;
        let err = match (parameter.value_kind(), value) {
            // SAFETY: open handle; settable is a valid out pointer.
            (ValueKind::FloatingPoint, ParameterValue::Float(v)) => unsafe {
                Picam_CanSetParameterFloatingPointValue(handle, raw, v, &mut settable)
            },
            // SAFETY: open handle; settable is a valid out pointer.
            (ValueKind::Integer, ParameterValue::Integer(v)) => unsafe {
                Picam_CanSetParameterIntegerValue(handle, raw, v, &mut settable)
            },
            _ => return Err(kind_mismatch(parameter, value)),
        };
        check(err)?;
        Ok(is_true(settable))
    }

    fn constraint_type(&self, parameter: ParameterId) -> DeviceResult<ConstraintType> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let mut raw: PicamConstraintType = PicamConstraintType_None;
        // SAFETY: open handle; raw is a valid out pointer.
        check(unsafe {
            Picam_GetParameterConstraintType(handle, picam_parameter(parameter), &mut raw)
        })?;
        let constraint_type = if raw == PicamConstraintType_Range {
            ConstraintType::Range
        } else if raw == PicamConstraintType_Collection {
            ConstraintType::Collection
        } else if raw == PicamConstraintType_Rois {
            ConstraintType::Rois
        } else if raw == PicamConstraintType_Pulse {
            ConstraintType::Pulse
        } else if raw == PicamConstraintType_Modulations {
            ConstraintType::Modulations
        } else {
            ConstraintType::None
        };
        Ok(constraint_type)
    }

    fn range_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RangeConstraint>> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        let mut raw: *const PicamRangeConstraint = ptr::null();
        // SAFETY: open handle; raw is a valid out pointer.
        check(unsafe {
            Picam_GetParameterRangeConstraint(
                handle,
                picam_parameter(parameter),
                picam_category(category),
                &mut raw,
            )
        })?;
        // SAFETY: on success the SDK returns a valid constraint until destroyed.
        let Some(constraint) = (unsafe { raw.as_ref() }) else {
            return Err(DeviceError::InvalidConstraintType(parameter));
        };
        let value = range_constraint(constraint);
        Ok(VendorObject::new(state.park(Allocation::Range(raw)), value))
    }

    fn collection_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<CollectionConstraint>> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        let mut raw: *const PicamCollectionConstraint = ptr::null();
        // SAFETY: open handle; raw is a valid out pointer.
        check(unsafe {
            Picam_GetParameterCollectionConstraint(
                handle,
                picam_parameter(parameter),
                picam_category(category),
                &mut raw,
            )
        })?;
        // SAFETY: on success the SDK returns a valid constraint until destroyed.
        let Some(constraint) = (unsafe { raw.as_ref() }) else {
            return Err(DeviceError::InvalidConstraintType(parameter));
        };
        let values = if constraint.values_array.is_null() || constraint.values_count <= 0 {
            Vec::new()
        } else {
            // SAFETY: values_array holds values_count elements.
            unsafe {
                std::slice::from_raw_parts(
                    constraint.values_array,
                    constraint.values_count as usize,
                )
            }
            .to_vec()
        };
        Ok(VendorObject::new(
            state.park(Allocation::Collection(raw)),
            CollectionConstraint::new(values),
        ))
    }

    fn rois_constraint(
        &self,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RoisConstraint>> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        let mut raw: *const PicamRoisConstraint = ptr::null();
        // SAFETY: open handle; raw is a valid out pointer.
        check(unsafe {
            Picam_GetParameterRoisConstraint(
                handle,
                PicamParameter_Rois,
                picam_category(category),
                &mut raw,
            )
        })?;
        // SAFETY: on success the SDK returns a valid constraint until destroyed.
        let Some(constraint) = (unsafe { raw.as_ref() }) else {
            return Err(DeviceError::InvalidConstraintType(ParameterId::Rois));
        };
        let value = RoisConstraint {
            x: range_constraint(&constraint.x_constraint),
            y: range_constraint(&constraint.y_constraint),
            width: range_constraint(&constraint.width_constraint),
            height: range_constraint(&constraint.height_constraint),
            maximum_roi_count: usize::try_from(constraint.maximum_roi_count).unwrap_or(0),
        };
        Ok(VendorObject::new(
            state.park(Allocation::RoisConstraint(raw)),
            value,
        ))
    }

    fn current_rois(&self) -> DeviceResult<VendorObject<Rois>> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        let mut raw: *const PicamRois = ptr::null();
        // SAFETY: open handle; raw is a valid out pointer.
        check(unsafe { Picam_GetParameterRoisValue(handle, PicamParameter_Rois, &mut raw) })?;
        // SAFETY: on success the SDK returns valid ROIs until destroyed.
        let Some(rois) = (unsafe { raw.as_ref() }) else {
            return Err(DeviceError::InvalidRois("device returned no ROI value".to_string()));
        };
        let regions = if rois.roi_array.is_null() || rois.roi_count <= 0 {
            Vec::new()
        } else {
            // SAFETY: roi_array holds roi_count elements.
            unsafe { std::slice::from_raw_parts(rois.roi_array, rois.roi_count as usize) }
                .iter()
                .map(|r| Roi {
                    x: r.x,
                    y: r.y,
                    width: r.width,
                    height: r.height,
                    x_binning: r.x_binning,
                    y_binning: r.y_binning,
                })
                .collect()
        };
        Ok(VendorObject::new(
            state.park(Allocation::Rois(raw)),
            Rois { regions },
        ))
    }

    fn set_rois(&self, rois: &Rois) -> DeviceResult<()> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let mut regions: Vec<PicamRoi> = rois
            .regions
            .iter()
            .map(|r| PicamRoi {
                x: r.x,
                width: r.width,
                x_binning: r.x_binning,
                y: r.y,
                height: r.height,
                y_binning: r.y_binning,
            })
            .collect();
        let raw = PicamRois {
            roi_array: regions.as_mut_ptr(),
            roi_count: piint::try_from(regions.len())
                .map_err(|_| DeviceError::InvalidRois(format!("{} regions", regions.len())))?,
        };
        // SAFETY: open handle; raw points at `regions`, which outlives the call.
        check(unsafe { Picam_SetParameterRoisValue(handle, PicamParameter_Rois, &raw) })
    }

    fn are_parameters_committed(&self) -> DeviceResult<bool> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let mut committed: pibln = 0;
        // SAFETY: open handle; committed is a valid out pointer.
        check(unsafe { Picam_AreParametersCommitted(handle, &mut committed) })?;
        Ok(is_true(committed))
    }

    fn commit_parameters(&self) -> DeviceResult<VendorObject<Vec<ParameterId>>> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        let mut failed: *const PicamParameter = ptr::null();
        let mut failed_count: piint = 0;
        // SAFETY: open handle; both are valid out pointers.
        let err = unsafe { Picam_CommitParameters(handle, &mut failed, &mut failed_count) };
        if !commit_reports_rejections(err, failed_count) {
            if !failed.is_null() {
                // SAFETY: failed came from Picam_CommitParameters and is not parked.
                let destroyed = unsafe { Picam_DestroyParameters(failed) };
                if destroyed != PicamError_None {
                    tracing::warn!(
                        "Failed to destroy failed-parameter list: {}",
                        sdk_error(destroyed)
                    );
                }
            }
            return Err(sdk_error(err));
        }
        let raw_failed: &[PicamParameter] = if failed.is_null() || failed_count <= 0 {
            &[]
        } else {
            // SAFETY: failed holds failed_count elements until destroyed.
            unsafe { std::slice::from_raw_parts(failed, failed_count as usize) }
        };
        let mut rejected = Vec::with_capacity(raw_failed.len());
        for raw in raw_failed {
            match parameter_id(*raw) {
                Some(parameter) => rejected.push(parameter),
                None => tracing::warn!(
                    code = *raw as i64,
                    "Commit rejected a parameter this driver does not manage"
                ),
            }
        }
        Ok(VendorObject::new(
            state.park(Allocation::Parameters(failed)),
            rejected,
        ))
    }

    fn read_live_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let raw = picam_parameter(parameter);
        match parameter.value_kind() {
            ValueKind::FloatingPoint => {
                let mut value: piflt = 0.0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe { Picam_ReadParameterFloatingPointValue(handle, raw, &mut value) })?;
                Ok(ParameterValue::Float(value))
            }
            ValueKind::Integer => {
                let mut value: piint = 0;
                // SAFETY: open handle; value is a valid out pointer.
                check(unsafe { Picam_ReadParameterIntegerValue(handle, raw, &mut value) })?;
                Ok(ParameterValue::Integer(value))
            }
            ValueKind::Rois => Err(rois_kind_error(parameter)),
        }
    }

    fn acquire(&self, readout_count: u64, timeout: AcquireTimeout) -> DeviceResult<AcquiredData> {
        let state = self.state.lock();
        let handle = state.handle()?;
        let count = pi64s::try_from(readout_count).map_err(|_| {
            DeviceError::AcquisitionFailed(format!("{} readouts requested", readout_count))
        })?;
        let timeout_ms: piint = match timeout {
            AcquireTimeout::Infinite => -1,
            AcquireTimeout::Millis(ms) => piint::try_from(ms).unwrap_or(piint::MAX),
        };

        // SAFETY: PicamAvailableData is plain data; all-zero is a valid value.
        let mut available: PicamAvailableData = unsafe { std::mem::zeroed() };
        let mut errors: PicamAcquisitionErrorsMask = PicamAcquisitionErrorsMask_None;
        // SAFETY: open handle; both are valid out pointers. Blocks until done.
        check(unsafe { Picam_Acquire(handle, count, timeout_ms, &mut available, &mut errors) })?;

        let stride = match state.get_value(ParameterId::ReadoutStride)? {
            ParameterValue::Integer(bytes) => usize::try_from(bytes).unwrap_or(0),
            ParameterValue::Float(bytes) => bytes as usize,
        };
        let captured = u64::try_from(available.readout_count).unwrap_or(0);
        let length = usize::try_from(captured)
            .ok()
            .and_then(|n| n.checked_mul(stride))
            .unwrap_or(0);
        let bytes = if available.initial_readout.is_null() || length == 0 {
            Vec::new()
        } else {
            // SAFETY: the buffer holds readout_count readouts of `stride` bytes
            // and stays valid until the next acquisition on this handle.
            unsafe { std::slice::from_raw_parts(available.initial_readout as *const u8, length) }
                .to_vec()
        };

        Ok(AcquiredData {
            readout_count: captured,
            readout_stride: stride,
            bytes,
            errors: AcquisitionErrors::from_bits_retain(errors as u32),
        })
    }

    fn release(&self, object: ObjectId) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let allocation = state
            .allocations
            .remove(&object)
            .ok_or(DeviceError::InvalidObject(object))?;
        // SAFETY: parked pointers are destroyed exactly once, here or on drop.
        check(unsafe { allocation.destroy() })
    }

    fn close(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        let handle = state.handle()?;
        state.open = false;
        // SAFETY: handle was opened by this camera and is closed only once.
        check(unsafe { Picam_CloseCamera(handle) })
    }
}

impl Drop for PicamCamera {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (id, allocation) in state.allocations.drain() {
            tracing::warn!(object = %id, "Destroying unreleased PICam allocation");
            // SAFETY: parked pointers are destroyed exactly once.
            let err = unsafe { allocation.destroy() };
            if err != PicamError_None {
                tracing::warn!(object = %id, "Failed to destroy allocation: {}", sdk_error(err));
            }
        }
        if state.open {
            state.open = false;
            // SAFETY: handle is still open and closed only here.
            let err = unsafe { Picam_CloseCamera(state.handle) };
            if err != PicamError_None {
                tracing::warn!("Failed to close camera: {}", sdk_error(err));
            }
        }
    }
}

// =============================================================================
// Library
// =============================================================================

/// Entry point to cameras reachable through the PICam SDK.
pub struct PicamLibrary {
    _library: LibraryRef,
}

impl PicamLibrary {
    /// Initialize the SDK (or join an existing initialization).
    pub fn new() -> DeviceResult<Self> {
        Ok(Self {
            _library: LibraryRef::acquire()?,
        })
    }
}

impl CameraLibrary for PicamLibrary {
    type Device = PicamCamera;

    fn open_first(&self) -> DeviceResult<PicamCamera> {
        let library = LibraryRef::acquire()?;
        let mut handle: PicamHandle = ptr::null_mut();
        // SAFETY: SDK initialized; handle is a valid out pointer.
        check(unsafe { Picam_OpenFirstCamera(&mut handle) })?;
        Ok(PicamCamera::new(handle, library))
    }

    fn connect_demo(&self, model: CameraModel, serial_number: &str) -> DeviceResult<PicamCamera> {
        let library = LibraryRef::acquire()?;
        let serial = CString::new(serial_number).map_err(|_| DeviceError::Sdk {
            code: -1,
            message: format!("serial number {:?} contains a NUL byte", serial_number),
        })?;
        // SAFETY: PicamCameraID is plain data; all-zero is a valid value.
        let mut id: PicamCameraID = unsafe { std::mem::zeroed() };
        // SAFETY: serial is a valid C string; id is a valid out pointer.
        check(unsafe { Picam_ConnectDemoCamera(picam_model(model), serial.as_ptr(), &mut id) })?;
        let mut handle: PicamHandle = ptr::null_mut();
        // SAFETY: id was filled in by Picam_ConnectDemoCamera.
        check(unsafe { Picam_OpenCamera(&id, &mut handle) })?;
        Ok(PicamCamera::new(handle, library))
    }
}
