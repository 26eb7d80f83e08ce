//! Sensor temperature readout.
//!
//! Both values are live reads from hardware; staged and committed parameter
//! values are never consulted.

use crate::error::TemperatureError;
use capture_core::{CameraDevice, ParameterId, SensorTemperatureStatus};
use std::fmt;

/// Live sensor temperature and its regulation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    /// Degrees Celsius.
    pub celsius: f64,
    /// Reported as-is; unknown codes are kept, not rejected.
    pub status: SensorTemperatureStatus,
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} °C ({})", self.celsius, self.status)
    }
}

/// Reads the live sensor temperature.
pub struct TemperatureMonitor;

impl TemperatureMonitor {
    /// Read the temperature, then its status.
    pub fn read<D: CameraDevice + ?Sized>(device: &D) -> Result<TemperatureReading, TemperatureError> {
        let celsius = device
            .read_live_value(ParameterId::SensorTemperatureReading)
            .map_err(TemperatureError::Reading)?
            .as_f64();
        let status = device
            .read_live_value(ParameterId::SensorTemperatureStatus)
            .map_err(TemperatureError::Status)?;
        let status = SensorTemperatureStatus::from_code(status.as_f64() as i32);

        let reading = TemperatureReading { celsius, status };
        tracing::info!(celsius, %status, "Sensor temperature");
        Ok(reading)
    }
}
