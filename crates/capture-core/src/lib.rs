//! `capture-core`
//!
//! Device-facing types and the collaborator trait for picam-capture.
//!
//! This crate holds everything the camera components agree on without knowing
//! which backend is behind them:
//!
//! - [`parameter`]: parameter identifiers, value kinds and vendor enumerations
//! - [`constraint`]: range/collection constraints and their legality rules
//! - [`roi`]: region-of-interest descriptors and the ROI constraint
//! - [`device`]: the [`CameraDevice`] / [`CameraLibrary`] traits every backend implements
//! - [`error`]: [`DeviceError`], the vendor-layer failure type
//! - [`config`]: layered [`CaptureConfig`] loading (defaults → TOML → environment)
//!
//! ## Threading
//!
//! Vendor SDKs of this family require exclusive use of a camera handle. Device
//! methods take `&self`; backends serialize access internally so a handle can be
//! shared by reference across components without concurrent calls reaching the SDK.

pub mod config;
pub mod constraint;
pub mod device;
pub mod error;
pub mod parameter;
pub mod roi;

pub use config::{
    CaptureConfig, CommitPolicy, CommitPolicyConfig, ConfigError, ConfigOverrides,
    DemoCameraConfig, LogFormat, SequenceConfig,
};
pub use constraint::{
    CollectionConstraint, ConstraintCategory, ConstraintDescriptor, ConstraintType,
    RangeConstraint,
};
pub use device::{
    AcquireTimeout, AcquiredData, AcquisitionErrors, CameraDevice, CameraId, CameraLibrary,
    CameraModel, ObjectId, VendorObject,
};
pub use error::{DeviceError, DeviceResult, SDK_CODE_BASE};
pub use parameter::{
    AdcAnalogGain, ParameterId, ParameterValue, ReadoutControlMode, SensorTemperatureStatus,
    TriggerDetermination, TriggerResponse, ValueKind,
};
pub use roi::{Roi, Rois, RoisConstraint};
