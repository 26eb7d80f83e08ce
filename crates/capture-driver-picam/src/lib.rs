//! Princeton Instruments PICam Camera Driver (Componentized)
//!
//! Components, leaves first:
//! - Connection: opening (real camera or demo fallback) and closing
//! - Constraints: required/recommended constraint lookup
//! - Commit: stage-then-commit of single parameters
//! - Sequencer: the ordered acquisition setup
//! - Temperature: live sensor temperature
//! - ROI: geometry validation, ROI commit, acquisition and frame dump
//!
//! Backends implement [`capture_core::CameraDevice`]. [`simulated`] is always
//! available; `hardware` talks to the PICam SDK and needs the `picam_sdk`
//! feature.

pub mod components;
pub mod error;
#[cfg(feature = "picam_sdk")]
pub mod hardware;
pub mod simulated;

pub use crate::components::commit::{
    CommitEngine, CommitOutcome, CommitReport, CommitStep, StepFailure,
};
pub use crate::components::connection::{CameraHandle, CameraSource};
pub use crate::components::constraints::{ConstraintResolver, ConstraintSet};
pub use crate::components::release::ReleaseGuard;
pub use crate::components::roi::{AcquisitionSummary, GeometryViolation, RoiPipeline, RoiRequest};
pub use crate::components::sequencer::{ConfigurationSequencer, SequenceReport, SequenceStep};
pub use crate::components::temperature::{TemperatureMonitor, TemperatureReading};
pub use crate::error::{
    AcquisitionFailure, CommitError, ConstraintError, OpenError, RoiError, SequenceError,
    StepError, TemperatureError,
};
#[cfg(feature = "picam_sdk")]
pub use crate::hardware::{PicamCamera, PicamLibrary};
pub use crate::simulated::{SimulatedCamera, SimulatedLibrary, SimulatedInspector};
