//! Parameter identifiers, values and vendor enumerations.
//!
//! A [`ParameterId`] names one configurable (or read-only) camera property.
//! Each identifier has a fixed [`ValueKind`]; the setter and getter used for it
//! follow from that kind. Enumerated parameters (gain, trigger response, ...)
//! travel over the device boundary as their vendor integer code.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Parameter Identifiers
// =============================================================================

/// Value kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `f64` values.
    FloatingPoint,
    /// `i32` values, including enumerations and booleans.
    Integer,
    /// Region collections.
    Rois,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::FloatingPoint => "floating-point",
            ValueKind::Integer => "integer",
            ValueKind::Rois => "rois",
        };
        write!(f, "{}", label)
    }
}

/// Camera parameter identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterId {
    /// Exposure time in milliseconds.
    ExposureTime,
    /// ADC speed in MHz.
    AdcSpeed,
    /// ADC analog gain.
    AdcAnalogGain,
    /// Clean the sensor until a trigger arrives.
    CleanUntilTrigger,
    /// Response to an external trigger.
    TriggerResponse,
    /// Trigger polarity or edge.
    TriggerDetermination,
    /// Clean cycles before each exposure.
    CleanCycleCount,
    /// Rows per clean cycle.
    CleanCycleHeight,
    /// Rows per final clean section.
    CleanSectionFinalHeight,
    /// Number of final clean sections. Legal values depend on the final height.
    CleanSectionFinalHeightCount,
    /// Set point in degrees Celsius.
    SensorTemperatureSetPoint,
    /// Live sensor temperature in degrees Celsius. Read-only.
    SensorTemperatureReading,
    /// Temperature lock status. Read-only.
    SensorTemperatureStatus,
    /// Readout control mode.
    ReadoutControlMode,
    /// Bytes per readout. Read-only.
    ReadoutStride,
    /// Readout time in milliseconds. Read-only.
    ReadoutTimeCalculation,
    /// Bits per pixel. Read-only.
    PixelBitDepth,
    /// Readout regions.
    Rois,
}

impl ParameterId {
    /// Every identifier, in declaration order.
    pub const ALL: [ParameterId; 18] = [
        ParameterId::ExposureTime,
        ParameterId::AdcSpeed,
        ParameterId::AdcAnalogGain,
        ParameterId::CleanUntilTrigger,
        ParameterId::TriggerResponse,
        ParameterId::TriggerDetermination,
        ParameterId::CleanCycleCount,
        ParameterId::CleanCycleHeight,
        ParameterId::CleanSectionFinalHeight,
        ParameterId::CleanSectionFinalHeightCount,
        ParameterId::SensorTemperatureSetPoint,
        ParameterId::SensorTemperatureReading,
        ParameterId::SensorTemperatureStatus,
        ParameterId::ReadoutControlMode,
        ParameterId::ReadoutStride,
        ParameterId::ReadoutTimeCalculation,
        ParameterId::PixelBitDepth,
        ParameterId::Rois,
    ];

    /// Fixed value kind of this parameter.
    pub fn value_kind(self) -> ValueKind {
        match self {
            ParameterId::ExposureTime
            | ParameterId::AdcSpeed
            | ParameterId::SensorTemperatureSetPoint
            | ParameterId::SensorTemperatureReading
            | ParameterId::ReadoutTimeCalculation => ValueKind::FloatingPoint,
            ParameterId::Rois => ValueKind::Rois,
            _ => ValueKind::Integer,
        }
    }

    /// Human-readable name, as the vendor's enumeration strings spell it.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterId::ExposureTime => "Exposure Time",
            ParameterId::AdcSpeed => "ADC Speed",
            ParameterId::AdcAnalogGain => "ADC Analog Gain",
            ParameterId::CleanUntilTrigger => "Clean Until Trigger",
            ParameterId::TriggerResponse => "Trigger Response",
            ParameterId::TriggerDetermination => "Trigger Determination",
            ParameterId::CleanCycleCount => "Clean Cycle Count",
            ParameterId::CleanCycleHeight => "Clean Cycle Height",
            ParameterId::CleanSectionFinalHeight => "Clean Section Final Height",
            ParameterId::CleanSectionFinalHeightCount => "Clean Section Final Height Count",
            ParameterId::SensorTemperatureSetPoint => "Sensor Temperature Set Point",
            ParameterId::SensorTemperatureReading => "Sensor Temperature Reading",
            ParameterId::SensorTemperatureStatus => "Sensor Temperature Status",
            ParameterId::ReadoutControlMode => "Readout Control Mode",
            ParameterId::ReadoutStride => "Readout Stride",
            ParameterId::ReadoutTimeCalculation => "Readout Time Calculation",
            ParameterId::PixelBitDepth => "Pixel Bit Depth",
            ParameterId::Rois => "Rois",
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Parameter Values
// =============================================================================

/// A scalar parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// Floating-point value.
    Float(f64),
    /// Integer value.
    Integer(i32),
}

impl ParameterValue {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ParameterValue::Float(_) => ValueKind::FloatingPoint,
            ParameterValue::Integer(_) => ValueKind::Integer,
        }
    }

    /// Numeric value as `f64`, the representation constraints are expressed in.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParameterValue::Float(v) => v,
            ParameterValue::Integer(v) => f64::from(v),
        }
    }

    /// Integer payload, if this is an integer value.
    pub fn as_integer(&self) -> Option<i32> {
        match *self {
            ParameterValue::Integer(v) => Some(v),
            ParameterValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Integer(i32::from(value))
    }
}

// =============================================================================
// Vendor Enumerations
// =============================================================================

/// ADC analog gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdcAnalogGain {
    /// Lowest gain.
    Low,
    /// Medium gain.
    Medium,
    /// Highest gain.
    High,
}

impl AdcAnalogGain {
    /// Vendor integer code.
    pub fn code(self) -> i32 {
        match self {
            AdcAnalogGain::Low => 1,
            AdcAnalogGain::Medium => 2,
            AdcAnalogGain::High => 3,
        }
    }
}

/// How the camera responds to an external trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerResponse {
    /// Triggers are ignored.
    NoResponse,
    /// One readout per trigger.
    ReadoutPerTrigger,
    /// One row shift per trigger.
    ShiftPerTrigger,
    /// Expose while the trigger pulse is held.
    ExposeDuringTriggerPulse,
    /// A single trigger starts the whole acquisition.
    StartOnSingleTrigger,
}

impl TriggerResponse {
    /// Vendor integer code.
    pub fn code(self) -> i32 {
        match self {
            TriggerResponse::NoResponse => 1,
            TriggerResponse::ReadoutPerTrigger => 2,
            TriggerResponse::ShiftPerTrigger => 3,
            TriggerResponse::ExposeDuringTriggerPulse => 4,
            TriggerResponse::StartOnSingleTrigger => 5,
        }
    }
}

/// Trigger polarity / edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerDetermination {
    /// Active high.
    PositivePolarity,
    /// Active low.
    NegativePolarity,
    /// Low-to-high transition.
    RisingEdge,
    /// High-to-low transition.
    FallingEdge,
}

impl TriggerDetermination {
    /// Vendor integer code.
    pub fn code(self) -> i32 {
        match self {
            TriggerDetermination::PositivePolarity => 1,
            TriggerDetermination::NegativePolarity => 2,
            TriggerDetermination::RisingEdge => 3,
            TriggerDetermination::FallingEdge => 4,
        }
    }
}

/// Sensor readout control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadoutControlMode {
    /// Whole sensor is read out after each exposure.
    FullFrame,
    /// Image is shifted to a masked area while the next exposure runs.
    FrameTransfer,
    /// Sensor is split into stacked sub-frames.
    Kinetics,
    /// Kinetics with single-row sub-frames.
    SpectraKinetics,
    /// Interline transfer sensor.
    Interline,
    /// Dual-image feature.
    Dif,
}

impl ReadoutControlMode {
    /// Vendor integer code.
    pub fn code(self) -> i32 {
        match self {
            ReadoutControlMode::FullFrame => 1,
            ReadoutControlMode::FrameTransfer => 2,
            ReadoutControlMode::Kinetics => 3,
            ReadoutControlMode::SpectraKinetics => 4,
            ReadoutControlMode::Interline => 5,
            ReadoutControlMode::Dif => 6,
        }
    }
}

/// Sensor temperature regulation status.
///
/// Device-defined; codes this crate does not know are preserved, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorTemperatureStatus {
    /// Not yet at the set point.
    Unlocked,
    /// Holding the set point.
    Locked,
    /// Temperature regulation failed.
    Faulted,
    /// Code this crate has no name for.
    Unknown(i32),
}

impl SensorTemperatureStatus {
    /// Status for a vendor code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SensorTemperatureStatus::Unlocked,
            2 => SensorTemperatureStatus::Locked,
            3 => SensorTemperatureStatus::Faulted,
            other => SensorTemperatureStatus::Unknown(other),
        }
    }

    /// Vendor integer code; unknown codes round-trip.
    pub fn code(self) -> i32 {
        match self {
            SensorTemperatureStatus::Unlocked => 1,
            SensorTemperatureStatus::Locked => 2,
            SensorTemperatureStatus::Faulted => 3,
            SensorTemperatureStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for SensorTemperatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorTemperatureStatus::Unlocked => f.write_str("Unlocked"),
            SensorTemperatureStatus::Locked => f.write_str("Locked"),
            SensorTemperatureStatus::Faulted => f.write_str("Faulted"),
            SensorTemperatureStatus::Unknown(code) => write!(f, "Unknown ({})", code),
        }
    }
}
