//! Shared helpers for the component integration tests.

#![allow(dead_code)] // Not every test file uses every helper

use capture_core::{CameraModel, DeviceError};
use capture_driver_picam::simulated::{SimulatedCamera, SimulatedCameraBuilder, SimulatedInspector};

/// Sensor of the default demo camera.
pub const SENSOR_SIZE: i64 = 1024;

pub fn pixis() -> SimulatedCameraBuilder {
    SimulatedCamera::builder(CameraModel::Pixis1024BR)
}

/// Build `builder` and return the camera with its inspector.
pub fn open(builder: SimulatedCameraBuilder) -> (SimulatedCamera, SimulatedInspector) {
    let camera = builder.build();
    let inspector = camera.inspector();
    (camera, inspector)
}

pub fn disconnected() -> DeviceError {
    DeviceError::Disconnected
}
