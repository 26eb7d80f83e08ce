//! Simulated PICam camera.
//!
//! A pure-Rust stand-in for a demo camera. It is used when no hardware is
//! connected and by every test in this workspace. It models the parts of the
//! SDK the components depend on:
//!
//! - separate *staged* and *committed* parameter values, with `set_value`
//!   validating against the required constraint and `commit_parameters`
//!   applying or rejecting each staged value
//! - an ordering dependency between `CleanSectionFinalHeight` and
//!   `CleanSectionFinalHeightCount` (the count's legal maximum is derived from
//!   the committed height, and their product may not exceed the sensor height)
//! - vendor allocations that must be released, tracked so tests can assert
//!   that nothing leaked
//! - a sensor temperature that approaches the committed setpoint as it is read
//!
//! Every call is counted, and failures can be injected per operation (and
//! optionally per parameter) in the manner of the mock drivers' error configs.

use capture_core::{
    AcquireTimeout, AcquiredData, AcquisitionErrors, CameraDevice, CameraId, CameraLibrary,
    CameraModel, CollectionConstraint, ConstraintCategory, ConstraintDescriptor, ConstraintType,
    DeviceError, DeviceResult, ObjectId, ParameterId, ParameterValue, RangeConstraint, Roi, Rois,
    RoisConstraint, SensorTemperatureStatus, ValueKind, VendorObject,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Sensor temperature before any cooling.
pub const AMBIENT_TEMPERATURE_C: f64 = 25.0;

/// How far the sensor temperature moves toward the setpoint per live read.
pub const TEMPERATURE_STEP_C: f64 = 5.0;

const PIXEL_BIT_DEPTH: i32 = 16;
const BYTES_PER_PIXEL: usize = 2;

/// Sensor width, height and name of the models the simulator can emulate.
fn sensor_geometry(model: CameraModel) -> Option<(i32, i32, &'static str)> {
    match model {
        CameraModel::Pixis100F => Some((1340, 100, "E2V 1340 x 100 (CCD 81)(F)")),
        CameraModel::Pixis400BR => Some((1340, 400, "E2V 1340 x 400 (CCD 36)(B)(eXcelon)")),
        CameraModel::Pixis1024B => Some((1024, 1024, "E2V 1024 x 1024 (CCD 47-10)(B)")),
        CameraModel::Pixis1024BR => Some((1024, 1024, "E2V 1024 x 1024 (CCD 47-10)(BR)")),
        CameraModel::Pixis2048B => Some((2048, 2048, "E2V 2048 x 2048 (CCD 42-40)(B)")),
        CameraModel::ProEM512B => Some((512, 512, "E2V 512 x 512 (CCD 97)(B)")),
        CameraModel::Pylon400BR => Some((1340, 400, "E2V 1340 x 400 (CCD 36)(BR)")),
        CameraModel::Sophia2048B => Some((2048, 2048, "E2V 2048 x 2048 (CCD 42-40)(B)")),
        CameraModel::Unknown(_) => None,
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone)]
struct Injection {
    operation: &'static str,
    parameter: Option<ParameterId>,
    error: DeviceError,
}

/// Configures a [`SimulatedCamera`] before it is opened.
#[derive(Debug, Clone)]
pub struct SimulatedCameraBuilder {
    model: CameraModel,
    serial_number: String,
    readout_stride: Option<usize>,
    reject_on_commit: BTreeSet<ParameterId>,
    acquisition_errors: AcquisitionErrors,
    initial_temperature_c: f64,
    injections: Vec<Injection>,
}

impl SimulatedCameraBuilder {
    /// Serial number reported by the camera.
    pub fn serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = serial_number.into();
        self
    }

    /// Report this readout stride instead of deriving it from the ROI.
    pub fn readout_stride(mut self, bytes: usize) -> Self {
        self.readout_stride = Some(bytes);
        self
    }

    /// Reject `parameter` whenever it is staged at commit time.
    pub fn reject_on_commit(mut self, parameter: ParameterId) -> Self {
        self.reject_on_commit.insert(parameter);
        self
    }

    /// Error mask reported with every acquisition.
    pub fn acquisition_errors(mut self, errors: AcquisitionErrors) -> Self {
        self.acquisition_errors = errors;
        self
    }

    /// Sensor temperature at open, before it drifts toward the set point.
    pub fn initial_temperature(mut self, celsius: f64) -> Self {
        self.initial_temperature_c = celsius;
        self
    }

    /// Fail every call of `operation` with `error`.
    pub fn fail_operation(mut self, operation: &'static str, error: DeviceError) -> Self {
        self.injections.push(Injection {
            operation,
            parameter: None,
            error,
        });
        self
    }

    /// Fail calls of `operation` on `parameter` with `error`.
    pub fn fail_parameter(
        mut self,
        operation: &'static str,
        parameter: ParameterId,
        error: DeviceError,
    ) -> Self {
        self.injections.push(Injection {
            operation,
            parameter: Some(parameter),
            error,
        });
        self
    }

    /// Open the camera.
    pub fn build(self) -> SimulatedCamera {
        let (width, height, sensor_name) =
            sensor_geometry(self.model).unwrap_or((1024, 1024, "Unknown sensor"));

        let mut committed = BTreeMap::new();
        for parameter in ParameterId::ALL {
            if let Some(def) = ParameterDef::for_parameter(parameter) {
                if def.writable {
                    committed.insert(parameter, def.default);
                }
            }
        }

        let state = SimState {
            sensor_width: width,
            sensor_height: height,
            open: true,
            committed,
            staged: BTreeMap::new(),
            committed_rois: Rois::single(Roi::full_sensor(width, height)),
            staged_rois: None,
            outstanding: BTreeSet::new(),
            next_object_id: 1,
            live_temperature_c: self.initial_temperature_c,
            counters: CallCounters::default(),
            set_history: Vec::new(),
            injections: self.injections,
            reject_on_commit: self.reject_on_commit,
            acquisition_errors: self.acquisition_errors,
            stride_override: self.readout_stride,
        };

        SimulatedCamera {
            id: CameraId {
                model: self.model,
                serial_number: self.serial_number,
                sensor_name: sensor_name.to_string(),
            },
            state: Arc::new(Mutex::new(state)),
        }
    }
}

// =============================================================================
// Parameter Table
// =============================================================================

struct ParameterDef {
    writable: bool,
    live_readable: bool,
    default: ParameterValue,
}

impl ParameterDef {
    fn writable(default: ParameterValue) -> Self {
        Self {
            writable: true,
            live_readable: false,
            default,
        }
    }

    fn read_only(default: ParameterValue, live_readable: bool) -> Self {
        Self {
            writable: false,
            live_readable,
            default,
        }
    }

    fn for_parameter(parameter: ParameterId) -> Option<Self> {
        use ParameterValue::{Float, Integer};
        let def = match parameter {
            ParameterId::ExposureTime => Self::writable(Float(50.0)),
            ParameterId::AdcSpeed => Self::writable(Float(0.1)),
            ParameterId::AdcAnalogGain => Self::writable(Integer(2)),
            ParameterId::CleanUntilTrigger => Self::writable(Integer(0)),
            ParameterId::TriggerResponse => Self::writable(Integer(1)),
            ParameterId::TriggerDetermination => Self::writable(Integer(1)),
            ParameterId::CleanCycleCount => Self::writable(Integer(1)),
            ParameterId::CleanCycleHeight => Self::writable(Integer(16)),
            ParameterId::CleanSectionFinalHeight => Self::writable(Integer(1)),
            ParameterId::CleanSectionFinalHeightCount => Self::writable(Integer(1)),
            ParameterId::SensorTemperatureSetPoint => Self::writable(Float(-60.0)),
            ParameterId::ReadoutControlMode => Self::writable(Integer(1)),
            ParameterId::SensorTemperatureReading => {
                Self::read_only(Float(AMBIENT_TEMPERATURE_C), true)
            }
            ParameterId::SensorTemperatureStatus => Self::read_only(
                Integer(SensorTemperatureStatus::Unlocked.code()),
                true,
            ),
            ParameterId::ReadoutStride => Self::read_only(Integer(0), false),
            ParameterId::ReadoutTimeCalculation => Self::read_only(Float(0.0), false),
            ParameterId::PixelBitDepth => Self::read_only(Integer(PIXEL_BIT_DEPTH), false),
            ParameterId::Rois => return None,
        };
        Some(def)
    }
}

fn range(minimum: f64, maximum: f64, increment: f64) -> ConstraintDescriptor {
    ConstraintDescriptor::Range(RangeConstraint::new(minimum, maximum, increment))
}

fn collection(values: &[f64]) -> ConstraintDescriptor {
    ConstraintDescriptor::Collection(CollectionConstraint::new(values.to_vec()))
}

// =============================================================================
// Camera State
// =============================================================================

/// Number of calls the simulated camera has received, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    /// `set_value` calls, including rejected ones.
    pub set_calls: u32,
    /// `commit_parameters` calls.
    pub commit_calls: u32,
    /// Values actually pushed to hardware by commits.
    pub hardware_writes: u32,
    /// `release` calls.
    pub release_calls: u32,
    /// Live reads of read-only parameters.
    pub live_reads: u32,
    /// `acquire` calls.
    pub acquire_calls: u32,
    /// `close` calls.
    pub close_calls: u32,
}

struct SimState {
    sensor_width: i32,
    sensor_height: i32,
    open: bool,
    committed: BTreeMap<ParameterId, ParameterValue>,
    staged: BTreeMap<ParameterId, ParameterValue>,
    committed_rois: Rois,
    staged_rois: Option<Rois>,
    outstanding: BTreeSet<ObjectId>,
    next_object_id: u64,
    live_temperature_c: f64,
    counters: CallCounters,
    set_history: Vec<(ParameterId, ParameterValue)>,
    injections: Vec<Injection>,
    reject_on_commit: BTreeSet<ParameterId>,
    acquisition_errors: AcquisitionErrors,
    stride_override: Option<usize>,
}

impl SimState {
    fn ensure_open(&self) -> DeviceResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DeviceError::NotOpen)
        }
    }

    fn check(&self, operation: &'static str, parameter: Option<ParameterId>) -> DeviceResult<()> {
        let injected = self.injections.iter().find(|injection| {
            injection.operation == operation
                && (injection.parameter.is_none() || injection.parameter == parameter)
        });
        match injected {
            Some(injection) => Err(injection.error.clone()),
            None => Ok(()),
        }
    }

    /// Open check plus injected failures, the preamble of every handle call.
    fn enter(&self, operation: &'static str, parameter: Option<ParameterId>) -> DeviceResult<()> {
        self.ensure_open()?;
        self.check(operation, parameter)
    }

    fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        self.outstanding.insert(id);
        id
    }

    /// Value as seen through staging: staged if pending, else committed.
    fn current(&self, parameter: ParameterId) -> Option<ParameterValue> {
        self.staged
            .get(&parameter)
            .or_else(|| self.committed.get(&parameter))
            .copied()
    }

    fn current_rois(&self) -> &Rois {
        self.staged_rois.as_ref().unwrap_or(&self.committed_rois)
    }

    fn committed_integer(&self, parameter: ParameterId, fallback: i32) -> i32 {
        self.committed
            .get(&parameter)
            .and_then(ParameterValue::as_integer)
            .unwrap_or(fallback)
    }

    fn setpoint(&self) -> f64 {
        self.committed
            .get(&ParameterId::SensorTemperatureSetPoint)
            .map(ParameterValue::as_f64)
            .unwrap_or(AMBIENT_TEMPERATURE_C)
    }

    fn temperature_status(&self) -> SensorTemperatureStatus {
        if (self.live_temperature_c - self.setpoint()).abs() < 1e-9 {
            SensorTemperatureStatus::Locked
        } else {
            SensorTemperatureStatus::Unlocked
        }
    }

    fn stride_for(&self, rois: &Rois) -> usize {
        if let Some(stride) = self.stride_override {
            return stride;
        }
        let pixels: u64 = rois.regions.iter().map(Roi::binned_pixel_count).sum();
        pixels as usize * BYTES_PER_PIXEL
    }

    /// Estimated readout time in milliseconds.
    fn readout_time_ms(&self, rois: &Rois, adc_speed_mhz: f64) -> f64 {
        let pixels: u64 = rois.regions.iter().map(Roi::binned_pixel_count).sum();
        if adc_speed_mhz <= 0.0 {
            return 0.0;
        }
        pixels as f64 / (adc_speed_mhz * 1e6) * 1e3
    }

    fn computed_value(&self, parameter: ParameterId) -> Option<ParameterValue> {
        let value = match parameter {
            ParameterId::SensorTemperatureReading => {
                ParameterValue::Float(self.live_temperature_c)
            }
            ParameterId::SensorTemperatureStatus => {
                ParameterValue::Integer(self.temperature_status().code())
            }
            ParameterId::ReadoutStride => {
                let stride = self.stride_for(self.current_rois());
                ParameterValue::Integer(i32::try_from(stride).unwrap_or(i32::MAX))
            }
            ParameterId::ReadoutTimeCalculation => {
                let speed = self
                    .current(ParameterId::AdcSpeed)
                    .map(|v| v.as_f64())
                    .unwrap_or(0.0);
                ParameterValue::Float(self.readout_time_ms(self.current_rois(), speed))
            }
            _ => return None,
        };
        Some(value)
    }

    fn required_constraint(&self, parameter: ParameterId) -> Option<ConstraintDescriptor> {
        let height = f64::from(self.sensor_height);
        let descriptor = match parameter {
            ParameterId::ExposureTime => range(0.0, 10_000_000.0, 0.001),
            ParameterId::AdcSpeed => collection(&[0.1, 2.0]),
            ParameterId::AdcAnalogGain => collection(&[1.0, 2.0, 3.0]),
            ParameterId::CleanUntilTrigger => collection(&[0.0, 1.0]),
            ParameterId::TriggerResponse => collection(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            ParameterId::TriggerDetermination => collection(&[1.0, 2.0, 3.0, 4.0]),
            ParameterId::CleanCycleCount => range(0.0, 16383.0, 1.0),
            ParameterId::CleanCycleHeight => range(1.0, height, 1.0),
            ParameterId::CleanSectionFinalHeight => range(1.0, height, 1.0),
            ParameterId::CleanSectionFinalHeightCount => {
                let final_height = self
                    .committed_integer(ParameterId::CleanSectionFinalHeight, 1)
                    .max(1);
                let maximum = (self.sensor_height / final_height).max(1);
                range(1.0, f64::from(maximum), 1.0)
            }
            ParameterId::SensorTemperatureSetPoint => range(-80.0, 30.0, 1.0),
            ParameterId::ReadoutControlMode => collection(&[1.0]),
            _ => return None,
        };
        Some(descriptor)
    }

    fn recommended_constraint(&self, parameter: ParameterId) -> Option<ConstraintDescriptor> {
        let recommended = match parameter {
            ParameterId::ExposureTime => range(1.0, 60_000.0, 0.001),
            ParameterId::AdcSpeed => collection(&[2.0]),
            ParameterId::AdcAnalogGain => collection(&[2.0]),
            ParameterId::CleanCycleHeight => range(8.0, f64::from(self.sensor_height), 1.0),
            ParameterId::SensorTemperatureSetPoint => range(-75.0, -60.0, 1.0),
            _ => return self.required_constraint(parameter),
        };
        Some(recommended)
    }

    fn constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> Option<ConstraintDescriptor> {
        match category {
            ConstraintCategory::Required => self.required_constraint(parameter),
            ConstraintCategory::Recommended => self.recommended_constraint(parameter),
        }
    }

    fn rois_constraint(&self) -> RoisConstraint {
        let (width, height) = (f64::from(self.sensor_width), f64::from(self.sensor_height));
        RoisConstraint {
            x: RangeConstraint::new(0.0, width - 1.0, 1.0),
            y: RangeConstraint::new(0.0, height - 1.0, 1.0),
            width: RangeConstraint::new(1.0, width, 1.0),
            height: RangeConstraint::new(1.0, height, 1.0),
            maximum_roi_count: 1,
        }
    }

    fn validate_rois(&self, rois: &Rois) -> DeviceResult<()> {
        if rois.is_empty() || rois.len() > self.rois_constraint().maximum_roi_count {
            return Err(DeviceError::InvalidRois(format!(
                "{} regions requested",
                rois.len()
            )));
        }
        for roi in &rois.regions {
            let fits = roi.x >= 0
                && roi.y >= 0
                && roi.width >= 1
                && roi.height >= 1
                && roi.x_binning >= 1
                && roi.y_binning >= 1
                && i64::from(roi.x) + i64::from(roi.width) <= i64::from(self.sensor_width)
                && i64::from(roi.y) + i64::from(roi.height) <= i64::from(self.sensor_height);
            if !fits {
                return Err(DeviceError::InvalidRois(format!(
                    "{} does not fit a {}x{} sensor",
                    roi, self.sensor_width, self.sensor_height
                )));
            }
        }
        Ok(())
    }

    /// Staged parameters that fail validation at commit time.
    fn commit_rejections(&self) -> Vec<ParameterId> {
        let mut rejected: Vec<ParameterId> = self
            .staged
            .keys()
            .copied()
            .filter(|parameter| self.reject_on_commit.contains(parameter))
            .collect();

        let final_height = self.current(ParameterId::CleanSectionFinalHeight);
        let final_count = self.current(ParameterId::CleanSectionFinalHeightCount);
        if let (Some(ParameterValue::Integer(h)), Some(ParameterValue::Integer(n))) =
            (final_height, final_count)
        {
            if i64::from(h) * i64::from(n) > i64::from(self.sensor_height) {
                let culprit = if self
                    .staged
                    .contains_key(&ParameterId::CleanSectionFinalHeightCount)
                {
                    ParameterId::CleanSectionFinalHeightCount
                } else {
                    ParameterId::CleanSectionFinalHeight
                };
                if !rejected.contains(&culprit) {
                    rejected.push(culprit);
                }
            }
        }

        if self.staged_rois.is_some() && self.reject_on_commit.contains(&ParameterId::Rois) {
            rejected.push(ParameterId::Rois);
        }
        rejected.sort();
        rejected
    }
}

// =============================================================================
// Simulated Camera
// =============================================================================

/// An opened simulated camera.
pub struct SimulatedCamera {
    id: CameraId,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedCamera {
    /// Builder for a camera of `model` with default settings.
    pub fn builder(model: CameraModel) -> SimulatedCameraBuilder {
        SimulatedCameraBuilder {
            model,
            serial_number: "12345".to_string(),
            readout_stride: None,
            reject_on_commit: BTreeSet::new(),
            acquisition_errors: AcquisitionErrors::empty(),
            initial_temperature_c: AMBIENT_TEMPERATURE_C,
            injections: Vec::new(),
        }
    }

    /// Inspection handle that outlives the camera.
    pub fn inspector(&self) -> SimulatedInspector {
        SimulatedInspector {
            state: Arc::clone(&self.state),
        }
    }

    /// Fail every later call of `operation` with `error`.
    pub fn fail_operation(&self, operation: &'static str, error: DeviceError) {
        self.state.lock().injections.push(Injection {
            operation,
            parameter: None,
            error,
        });
    }

    /// Fail later calls of `operation` on `parameter` with `error`.
    pub fn fail_parameter(&self, operation: &'static str, parameter: ParameterId, error: DeviceError) {
        self.state.lock().injections.push(Injection {
            operation,
            parameter: Some(parameter),
            error,
        });
    }

    /// Drop every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().injections.clear();
    }

    /// Error mask reported by later acquisitions.
    pub fn set_acquisition_errors(&self, errors: AcquisitionErrors) {
        self.state.lock().acquisition_errors = errors;
    }
}

impl std::fmt::Debug for SimulatedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCamera").field("id", &self.id).finish()
    }
}

impl CameraDevice for SimulatedCamera {
    fn camera_id(&self) -> DeviceResult<CameraId> {
        self.state.lock().enter("camera_id", None)?;
        Ok(self.id.clone())
    }

    fn get_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let state = self.state.lock();
        state.enter("get_value", Some(parameter))?;
        if parameter.value_kind() == ValueKind::Rois {
            // scalar access to a ROI parameter
            return Err(DeviceError::InvalidParameterType {
                parameter,
                expected: ValueKind::Rois,
                actual: ValueKind::Integer,
            });
        }
        state
            .computed_value(parameter)
            .or_else(|| state.current(parameter))
            .or_else(|| ParameterDef::for_parameter(parameter).map(|def| def.default))
            .ok_or(DeviceError::ParameterDoesNotExist(parameter))
    }

    fn get_default_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let state = self.state.lock();
        state.enter("get_default_value", Some(parameter))?;
        let def = ParameterDef::for_parameter(parameter)
            .ok_or(DeviceError::ParameterDoesNotExist(parameter))?;
        let full_sensor = Rois::single(Roi::full_sensor(state.sensor_width, state.sensor_height));
        let default = match parameter {
            ParameterId::ReadoutStride => {
                let stride = full_sensor
                    .regions
                    .iter()
                    .map(Roi::binned_pixel_count)
                    .sum::<u64>() as usize
                    * BYTES_PER_PIXEL;
                ParameterValue::Integer(i32::try_from(stride).unwrap_or(i32::MAX))
            }
            ParameterId::ReadoutTimeCalculation => {
                let speed = ParameterDef::for_parameter(ParameterId::AdcSpeed)
                    .map(|s| s.default.as_f64())
                    .unwrap_or(0.0);
                ParameterValue::Float(state.readout_time_ms(&full_sensor, speed))
            }
            _ => def.default,
        };
        Ok(default)
    }

    fn set_value(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.counters.set_calls += 1;
        state.set_history.push((parameter, value));
        state.check("set_value", Some(parameter))?;

        let expected = parameter.value_kind();
        if expected != value.kind() {
            return Err(DeviceError::InvalidParameterType {
                parameter,
                expected,
                actual: value.kind(),
            });
        }
        let def = ParameterDef::for_parameter(parameter)
            .ok_or(DeviceError::ParameterDoesNotExist(parameter))?;
        if !def.writable {
            return Err(DeviceError::ParameterIsReadOnly(parameter));
        }
        let admitted = state
            .required_constraint(parameter)
            .is_some_and(|c| c.admits(value.as_f64()));
        if !admitted {
            return Err(DeviceError::InvalidParameterValue { parameter, value });
        }

        if state.committed.get(&parameter) == Some(&value) {
            state.staged.remove(&parameter);
        } else {
            state.staged.insert(parameter, value);
        }
        Ok(())
    }

    fn can_read(&self, parameter: ParameterId) -> DeviceResult<bool> {
        let state = self.state.lock();
        state.enter("can_read", Some(parameter))?;
        Ok(ParameterDef::for_parameter(parameter).is_some_and(|def| def.live_readable))
    }

    fn can_set(&self, parameter: ParameterId, value: ParameterValue) -> DeviceResult<bool> {
        let state = self.state.lock();
        state.enter("can_set", Some(parameter))?;
        let expected = parameter.value_kind();
        if expected != value.kind() {
            return Err(DeviceError::InvalidParameterType {
                parameter,
                expected,
                actual: value.kind(),
            });
        }
        let writable = ParameterDef::for_parameter(parameter).is_some_and(|def| def.writable);
        Ok(writable
            && state
                .required_constraint(parameter)
                .is_some_and(|c| c.admits(value.as_f64())))
    }

    fn constraint_type(&self, parameter: ParameterId) -> DeviceResult<ConstraintType> {
        let state = self.state.lock();
        state.enter("constraint_type", Some(parameter))?;
        if parameter == ParameterId::Rois {
            return Ok(ConstraintType::Rois);
        }
        Ok(state
            .required_constraint(parameter)
            .map(|c| c.constraint_type())
            .unwrap_or(ConstraintType::None))
    }

    fn range_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RangeConstraint>> {
        let mut state = self.state.lock();
        state.enter("range_constraint", Some(parameter))?;
        match state.constraint(parameter, category) {
            Some(ConstraintDescriptor::Range(range)) => {
                Ok(VendorObject::new(state.allocate(), range))
            }
            _ => Err(DeviceError::InvalidConstraintType(parameter)),
        }
    }

    fn collection_constraint(
        &self,
        parameter: ParameterId,
        category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<CollectionConstraint>> {
        let mut state = self.state.lock();
        state.enter("collection_constraint", Some(parameter))?;
        match state.constraint(parameter, category) {
            Some(ConstraintDescriptor::Collection(collection)) => {
                Ok(VendorObject::new(state.allocate(), collection))
            }
            _ => Err(DeviceError::InvalidConstraintType(parameter)),
        }
    }

    fn rois_constraint(
        &self,
        _category: ConstraintCategory,
    ) -> DeviceResult<VendorObject<RoisConstraint>> {
        let mut state = self.state.lock();
        state.enter("rois_constraint", Some(ParameterId::Rois))?;
        let constraint = state.rois_constraint();
        Ok(VendorObject::new(state.allocate(), constraint))
    }

    fn current_rois(&self) -> DeviceResult<VendorObject<Rois>> {
        let mut state = self.state.lock();
        state.enter("current_rois", Some(ParameterId::Rois))?;
        let rois = state.current_rois().clone();
        Ok(VendorObject::new(state.allocate(), rois))
    }

    fn set_rois(&self, rois: &Rois) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.enter("set_rois", Some(ParameterId::Rois))?;
        state.validate_rois(rois)?;
        if *rois == state.committed_rois {
            state.staged_rois = None;
        } else {
            state.staged_rois = Some(rois.clone());
        }
        Ok(())
    }

    fn are_parameters_committed(&self) -> DeviceResult<bool> {
        let state = self.state.lock();
        state.enter("are_parameters_committed", None)?;
        Ok(state.staged.is_empty() && state.staged_rois.is_none())
    }

    fn commit_parameters(&self) -> DeviceResult<VendorObject<Vec<ParameterId>>> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.counters.commit_calls += 1;
        state.check("commit_parameters", None)?;

        let rejected = state.commit_rejections();
        let staged = std::mem::take(&mut state.staged);
        for (parameter, value) in staged {
            if rejected.contains(&parameter) {
                continue;
            }
            state.committed.insert(parameter, value);
            state.counters.hardware_writes += 1;
        }
        if let Some(rois) = state.staged_rois.take() {
            if !rejected.contains(&ParameterId::Rois) {
                state.committed_rois = rois;
                state.counters.hardware_writes += 1;
            }
        }

        Ok(VendorObject::new(state.allocate(), rejected))
    }

    fn read_live_value(&self, parameter: ParameterId) -> DeviceResult<ParameterValue> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.counters.live_reads += 1;
        state.check("read_live_value", Some(parameter))?;

        match parameter {
            ParameterId::SensorTemperatureReading => {
                let setpoint = state.setpoint();
                let delta = setpoint - state.live_temperature_c;
                if delta.abs() <= TEMPERATURE_STEP_C {
                    state.live_temperature_c = setpoint;
                } else {
                    state.live_temperature_c += TEMPERATURE_STEP_C.copysign(delta);
                }
                Ok(ParameterValue::Float(state.live_temperature_c))
            }
            ParameterId::SensorTemperatureStatus => {
                Ok(ParameterValue::Integer(state.temperature_status().code()))
            }
            _ => Err(DeviceError::ParameterIsNotReadable(parameter)),
        }
    }

    fn acquire(&self, readout_count: u64, timeout: AcquireTimeout) -> DeviceResult<AcquiredData> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.counters.acquire_calls += 1;
        state.check("acquire", None)?;

        if readout_count == 0 {
            return Err(DeviceError::AcquisitionFailed(
                "readout count must be at least 1".to_string(),
            ));
        }
        if !state.staged.is_empty() || state.staged_rois.is_some() {
            return Err(DeviceError::AcquisitionFailed(
                "parameters are not committed".to_string(),
            ));
        }

        if let AcquireTimeout::Millis(limit) = timeout {
            let exposure = state
                .committed
                .get(&ParameterId::ExposureTime)
                .map(ParameterValue::as_f64)
                .unwrap_or(0.0);
            let speed = state
                .committed
                .get(&ParameterId::AdcSpeed)
                .map(ParameterValue::as_f64)
                .unwrap_or(0.0);
            let per_readout = exposure + state.readout_time_ms(&state.committed_rois, speed);
            if per_readout * readout_count as f64 > f64::from(limit) {
                return Err(DeviceError::AcquisitionFailed(format!(
                    "timed out after {} ms",
                    limit
                )));
            }
        }

        let stride = state.stride_for(&state.committed_rois);
        let total = usize::try_from(readout_count)
            .ok()
            .and_then(|count| count.checked_mul(stride))
            .ok_or_else(|| {
                DeviceError::AcquisitionFailed(format!(
                    "{} readouts of {} bytes do not fit in memory",
                    readout_count, stride
                ))
            })?;
        let bytes = (0..total).map(|i| (i % 256) as u8).collect();

        Ok(AcquiredData {
            readout_count,
            readout_stride: stride,
            bytes,
            errors: state.acquisition_errors,
        })
    }

    fn release(&self, object: ObjectId) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.counters.release_calls += 1;
        state.check("release", None)?;
        if state.outstanding.remove(&object) {
            Ok(())
        } else {
            Err(DeviceError::InvalidObject(object))
        }
    }

    fn close(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        state.counters.close_calls += 1;
        state.enter("close", None)?;
        state.open = false;
        Ok(())
    }
}

// =============================================================================
// Inspector
// =============================================================================

/// Read-only view of a simulated camera's internals, for assertions.
#[derive(Clone)]
pub struct SimulatedInspector {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedInspector {
    /// Snapshot of the call counters.
    pub fn counters(&self) -> CallCounters {
        self.state.lock().counters
    }

    /// Shorthand for `counters().commit_calls`.
    pub fn commit_calls(&self) -> u32 {
        self.counters().commit_calls
    }

    /// Shorthand for `counters().hardware_writes`.
    pub fn hardware_writes(&self) -> u32 {
        self.counters().hardware_writes
    }

    /// Shorthand for `counters().release_calls`.
    pub fn release_calls(&self) -> u32 {
        self.counters().release_calls
    }

    /// Shorthand for `counters().close_calls`.
    pub fn close_calls(&self) -> u32 {
        self.counters().close_calls
    }

    /// Vendor allocations not yet released.
    pub fn outstanding_objects(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    /// Every `set_value` call, in order, including rejected ones.
    pub fn set_history(&self) -> Vec<(ParameterId, ParameterValue)> {
        self.state.lock().set_history.clone()
    }

    /// Value last pushed to hardware for `parameter`.
    pub fn committed_value(&self, parameter: ParameterId) -> Option<ParameterValue> {
        self.state.lock().committed.get(&parameter).copied()
    }

    /// ROIs last pushed to hardware.
    pub fn committed_rois(&self) -> Rois {
        self.state.lock().committed_rois.clone()
    }

    /// Whether the camera is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

// =============================================================================
// Library
// =============================================================================

/// Camera library backed by simulated cameras.
///
/// `open_first` finds nothing unless a camera was attached, matching a
/// machine without hardware; `connect_demo` always succeeds for known models.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLibrary {
    attached: Option<SimulatedCameraBuilder>,
    demo_template: Option<SimulatedCameraBuilder>,
}

impl SimulatedLibrary {
    /// A library with no attached camera.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `camera` is connected.
    pub fn with_attached(mut self, camera: SimulatedCameraBuilder) -> Self {
        self.attached = Some(camera);
        self
    }

    /// Settings applied to demo cameras; model and serial number are overridden.
    pub fn with_demo_template(mut self, template: SimulatedCameraBuilder) -> Self {
        self.demo_template = Some(template);
        self
    }
}

impl CameraLibrary for SimulatedLibrary {
    type Device = SimulatedCamera;

    fn open_first(&self) -> DeviceResult<SimulatedCamera> {
        self.attached
            .clone()
            .map(SimulatedCameraBuilder::build)
            .ok_or(DeviceError::NotFound)
    }

    fn connect_demo(&self, model: CameraModel, serial_number: &str) -> DeviceResult<SimulatedCamera> {
        if sensor_geometry(model).is_none() {
            return Err(DeviceError::Sdk {
                code: 7,
                message: format!("demo cameras of model {} are not supported", model),
            });
        }
        let mut builder = self
            .demo_template
            .clone()
            .unwrap_or_else(|| SimulatedCamera::builder(model));
        builder.model = model;
        Ok(builder.serial_number(serial_number).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixis() -> SimulatedCamera {
        SimulatedCamera::builder(CameraModel::Pixis1024BR).build()
    }

    #[test]
    fn setting_the_committed_value_stages_nothing() {
        let camera = pixis();
        camera
            .set_value(ParameterId::AdcAnalogGain, ParameterValue::Integer(2))
            .unwrap();
        assert!(camera.are_parameters_committed().unwrap());

        camera
            .set_value(ParameterId::AdcAnalogGain, ParameterValue::Integer(3))
            .unwrap();
        assert!(!camera.are_parameters_committed().unwrap());
        // staged value is visible before commit
        assert_eq!(
            camera.get_value(ParameterId::AdcAnalogGain).unwrap(),
            ParameterValue::Integer(3)
        );
    }

    #[test]
    fn set_rejects_values_outside_required_constraint() {
        let camera = pixis();
        let err = camera
            .set_value(ParameterId::AdcSpeed, ParameterValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParameterValue { .. }));

        let err = camera
            .set_value(ParameterId::ReadoutStride, ParameterValue::Integer(4))
            .unwrap_err();
        assert_eq!(err, DeviceError::ParameterIsReadOnly(ParameterId::ReadoutStride));

        let err = camera
            .set_value(ParameterId::ExposureTime, ParameterValue::Integer(4))
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParameterType { .. }));
    }

    #[test]
    fn final_height_count_maximum_follows_committed_height() {
        let camera = pixis();
        camera
            .set_value(ParameterId::CleanSectionFinalHeight, ParameterValue::Integer(4))
            .unwrap();
        // not committed yet: maximum still derived from height 1
        let staged_max = camera
            .range_constraint(
                ParameterId::CleanSectionFinalHeightCount,
                ConstraintCategory::Required,
            )
            .unwrap();
        assert_eq!(staged_max.value.maximum, 1024.0);
        camera.release(staged_max.id).unwrap();

        let failed = camera.commit_parameters().unwrap();
        assert!(failed.value.is_empty());
        camera.release(failed.id).unwrap();

        let committed_max = camera
            .range_constraint(
                ParameterId::CleanSectionFinalHeightCount,
                ConstraintCategory::Required,
            )
            .unwrap();
        assert_eq!(committed_max.value.maximum, 256.0);
        camera.release(committed_max.id).unwrap();
    }

    #[test]
    fn commit_rejects_oversized_clean_section() {
        let camera = pixis();
        let inspector = camera.inspector();
        camera
            .set_value(ParameterId::CleanSectionFinalHeightCount, ParameterValue::Integer(250))
            .unwrap();
        let failed = camera.commit_parameters().unwrap();
        assert!(failed.value.is_empty());
        camera.release(failed.id).unwrap();

        // 8 x 250 exceeds 1024 rows
        camera
            .set_value(ParameterId::CleanSectionFinalHeight, ParameterValue::Integer(8))
            .unwrap();
        let failed = camera.commit_parameters().unwrap();
        assert_eq!(failed.value, vec![ParameterId::CleanSectionFinalHeight]);
        camera.release(failed.id).unwrap();
        assert_eq!(
            inspector.committed_value(ParameterId::CleanSectionFinalHeight),
            Some(ParameterValue::Integer(1))
        );
        assert!(camera.are_parameters_committed().unwrap());
    }

    #[test]
    fn temperature_approaches_setpoint_in_steps() {
        let camera = SimulatedCamera::builder(CameraModel::Pixis1024BR)
            .initial_temperature(-52.0)
            .build();
        let read = |p| camera.read_live_value(p).unwrap();
        assert_eq!(read(ParameterId::SensorTemperatureReading), ParameterValue::Float(-57.0));
        assert_eq!(
            read(ParameterId::SensorTemperatureStatus),
            ParameterValue::Integer(SensorTemperatureStatus::Unlocked.code())
        );
        assert_eq!(read(ParameterId::SensorTemperatureReading), ParameterValue::Float(-60.0));
        assert_eq!(
            read(ParameterId::SensorTemperatureStatus),
            ParameterValue::Integer(SensorTemperatureStatus::Locked.code())
        );
    }

    #[test]
    fn stride_tracks_committed_roi() {
        let camera = pixis();
        assert_eq!(
            camera.get_value(ParameterId::ReadoutStride).unwrap(),
            ParameterValue::Integer(1024 * 1024 * 2)
        );
        camera
            .set_rois(&Rois::single(Roi {
                x: 10,
                y: 10,
                width: 100,
                height: 50,
                x_binning: 1,
                y_binning: 1,
            }))
            .unwrap();
        let failed = camera.commit_parameters().unwrap();
        camera.release(failed.id).unwrap();
        assert_eq!(
            camera.get_value(ParameterId::ReadoutStride).unwrap(),
            ParameterValue::Integer(100 * 50 * 2)
        );
    }

    #[test]
    fn set_rois_rejects_regions_off_the_sensor() {
        let camera = pixis();
        let err = camera
            .set_rois(&Rois::single(Roi {
                x: 1000,
                y: 0,
                width: 100,
                height: 1,
                x_binning: 1,
                y_binning: 1,
            }))
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidRois(_)));
    }

    #[test]
    fn acquire_returns_frames_times_stride() {
        let camera = SimulatedCamera::builder(CameraModel::Pixis1024BR)
            .readout_stride(1024)
            .build();
        let data = camera.acquire(5, AcquireTimeout::Infinite).unwrap();
        assert_eq!(data.bytes.len(), 5120);
        assert_eq!(data.readout_stride, 1024);
        assert!(data.errors.is_empty());
        assert_eq!(data.bytes[257], 1);
    }

    #[test]
    fn acquire_refuses_uncommitted_changes_and_short_timeouts() {
        let camera = pixis();
        camera
            .set_value(ParameterId::ExposureTime, ParameterValue::Float(10.0))
            .unwrap();
        assert!(camera.acquire(1, AcquireTimeout::Infinite).is_err());
        let failed = camera.commit_parameters().unwrap();
        camera.release(failed.id).unwrap();
        assert!(camera.acquire(100, AcquireTimeout::Millis(5)).is_err());
        assert!(camera.acquire(1, AcquireTimeout::Infinite).is_ok());
    }

    #[test]
    fn release_of_unknown_object_fails() {
        let camera = pixis();
        assert_eq!(
            camera.release(ObjectId(999)),
            Err(DeviceError::InvalidObject(ObjectId(999)))
        );
    }

    #[test]
    fn injected_failures_target_one_parameter() {
        let camera = pixis();
        camera.fail_parameter("get_value", ParameterId::ExposureTime, DeviceError::Disconnected);
        assert_eq!(
            camera.get_value(ParameterId::ExposureTime),
            Err(DeviceError::Disconnected)
        );
        assert!(camera.get_value(ParameterId::AdcSpeed).is_ok());
        camera.clear_failures();
        assert!(camera.get_value(ParameterId::ExposureTime).is_ok());
    }

    #[test]
    fn closed_camera_refuses_calls() {
        let camera = pixis();
        let inspector = camera.inspector();
        camera.close().unwrap();
        assert!(!inspector.is_open());
        assert_eq!(camera.camera_id(), Err(DeviceError::NotOpen));
        assert_eq!(camera.close(), Err(DeviceError::NotOpen));
        assert_eq!(inspector.close_calls(), 2);
    }

    #[test]
    fn library_without_hardware_falls_back_to_demo() {
        let library = SimulatedLibrary::new();
        assert_eq!(library.open_first().unwrap_err(), DeviceError::NotFound);
        let camera = library
            .connect_demo(CameraModel::ProEM512B, "demo-7")
            .unwrap();
        let id = camera.camera_id().unwrap();
        assert_eq!(id.model, CameraModel::ProEM512B);
        assert_eq!(id.serial_number, "demo-7");
        assert!(library.connect_demo(CameraModel::Unknown(9999), "x").is_err());
    }
}
