//! PICam Connection Management
//!
//! Opens a camera (the first connected one, falling back to a demo camera) and
//! closes it exactly once.
//!
//! The handle is the only owner of the device. It is move-only; components
//! borrow the device through `Deref` and never close it themselves.

use crate::error::OpenError;
use capture_core::config::DemoCameraConfig;
use capture_core::{CameraDevice, CameraId, CameraLibrary, DeviceError, DeviceResult};
use std::ops::Deref;

/// Where an opened camera came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSource {
    /// A physically connected camera.
    Connected,
    /// A demo camera created because no hardware was found.
    Demo,
}

/// Owns one opened camera and closes it exactly once.
pub struct CameraHandle<D: CameraDevice> {
    device: D,
    id: CameraId,
    source: CameraSource,
    closed: bool,
}

impl<D: CameraDevice> CameraHandle<D> {
    /// Open the first connected camera, or a demo camera when none is found.
    ///
    /// Any failure of the first open falls back to the demo camera; only a
    /// failure to connect the demo camera is reported.
    pub fn open<L>(library: &L, demo: &DemoCameraConfig) -> Result<Self, OpenError>
    where
        L: CameraLibrary<Device = D>,
    {
        let (device, source) = match library.open_first() {
            Ok(device) => (device, CameraSource::Connected),
            Err(e) => {
                if e.is_not_found() {
                    tracing::info!("No camera found");
                } else {
                    tracing::warn!(code = e.code(), "Failed to open first camera: {}", e);
                }
                tracing::info!(
                    model = %demo.model,
                    serial = %demo.serial_number,
                    "Connecting demo camera"
                );
                let device = library
                    .connect_demo(demo.model, &demo.serial_number)
                    .map_err(OpenError::DemoConnect)?;
                (device, CameraSource::Demo)
            }
        };
        Self::from_device(device, source)
    }

    /// Take ownership of an already opened device.
    pub fn from_device(device: D, source: CameraSource) -> Result<Self, OpenError> {
        match device.camera_id() {
            Ok(id) => {
                tracing::info!(camera = %id, ?source, "Camera opened");
                Ok(Self {
                    device,
                    id,
                    source,
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = device.close() {
                    tracing::warn!("Failed to close unidentified camera: {}", close_err);
                }
                Err(OpenError::Identify(e))
            }
        }
    }

    /// Identity read when the camera was opened.
    pub fn id(&self) -> &CameraId {
        &self.id
    }

    /// Whether this is attached hardware or a demo camera.
    pub fn source(&self) -> CameraSource {
        self.source
    }

    /// Close now and report the outcome. Dropping the handle afterwards does nothing.
    pub fn close(mut self) -> DeviceResult<()> {
        self.close_once()
    }

    fn close_once(&mut self) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::NotOpen);
        }
        self.closed = true;
        tracing::info!(camera = %self.id, "Closing camera");
        self.device.close()
    }
}

impl<D: CameraDevice> Deref for CameraHandle<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: CameraDevice> Drop for CameraHandle<D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close_once() {
            tracing::warn!(code = e.code(), "Failed to close camera: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedCamera, SimulatedLibrary};
    use capture_core::CameraModel;

    #[test]
    fn falls_back_to_demo_camera() {
        let handle = CameraHandle::open(&SimulatedLibrary::new(), &DemoCameraConfig::default())
            .unwrap();
        assert_eq!(handle.source(), CameraSource::Demo);
        assert_eq!(handle.id().model, CameraModel::Pixis1024BR);
        assert_eq!(handle.id().serial_number, "12345");
    }

    #[test]
    fn prefers_connected_camera() {
        let library = SimulatedLibrary::new().with_attached(
            SimulatedCamera::builder(CameraModel::Pixis400BR).serial_number("LAB-1"),
        );
        let handle = CameraHandle::open(&library, &DemoCameraConfig::default()).unwrap();
        assert_eq!(handle.source(), CameraSource::Connected);
        assert_eq!(handle.id().serial_number, "LAB-1");
    }

    #[test]
    fn drop_closes_exactly_once() {
        let handle = CameraHandle::open(&SimulatedLibrary::new(), &DemoCameraConfig::default())
            .unwrap();
        let inspector = handle.inspector();
        drop(handle);
        assert_eq!(inspector.close_calls(), 1);
        assert!(!inspector.is_open());
    }

    #[test]
    fn explicit_close_is_not_repeated_on_drop() {
        let handle = CameraHandle::open(&SimulatedLibrary::new(), &DemoCameraConfig::default())
            .unwrap();
        let inspector = handle.inspector();
        handle.close().unwrap();
        assert_eq!(inspector.close_calls(), 1);
    }

    #[test]
    fn demo_connect_failure_is_reported() {
        let demo = DemoCameraConfig {
            model: CameraModel::Unknown(77),
            serial_number: "x".into(),
        };
        let result = CameraHandle::open(&SimulatedLibrary::new(), &demo);
        assert!(matches!(result, Err(OpenError::DemoConnect(_))));
    }

    #[test]
    fn unidentifiable_camera_is_closed() {
        let camera = SimulatedCamera::builder(CameraModel::Pixis1024BR)
            .fail_operation("camera_id", DeviceError::Disconnected)
            .build();
        let inspector = camera.inspector();
        let result = CameraHandle::from_device(camera, CameraSource::Connected);
        assert!(matches!(result, Err(OpenError::Identify(DeviceError::Disconnected))));
        assert_eq!(inspector.close_calls(), 1);
    }
}
