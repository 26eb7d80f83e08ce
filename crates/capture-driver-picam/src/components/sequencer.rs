//! Camera configuration sequence.
//!
//! Applies an ordered list of parameter values through [`CommitEngine`], one
//! commit per step. Order matters: the legal range of some parameters (e.g.
//! `CleanSectionFinalHeightCount`) is derived from values committed earlier.
//!
//! There is no rollback. Under [`CommitPolicy::BestEffort`] every step runs
//! regardless of earlier failures; under [`CommitPolicy::HardStop`] the first
//! aborted step ends the sequence.

use crate::components::commit::{CommitEngine, CommitReport};
use crate::error::SequenceError;
use capture_core::{CameraDevice, CommitPolicy, ParameterId, ParameterValue, SequenceConfig};

/// One parameter assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceStep {
    /// Parameter to set.
    pub parameter: ParameterId,
    /// Value to set it to.
    pub value: ParameterValue,
}

impl SequenceStep {
    /// Set `parameter` to `value`.
    pub fn new(parameter: ParameterId, value: impl Into<ParameterValue>) -> Self {
        Self {
            parameter,
            value: value.into(),
        }
    }
}

/// Per-step reports of a completed sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    /// One report per step that ran.
    pub steps: Vec<CommitReport>,
}

impl SequenceReport {
    /// Steps that recorded a failure or had parameters rejected.
    pub fn failed_steps(&self) -> impl Iterator<Item = &CommitReport> {
        self.steps.iter().filter(|report| !report.is_clean())
    }

    /// No step failed and nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.failed_steps().next().is_none()
    }
}

/// An ordered configuration sequence.
#[derive(Debug, Clone)]
pub struct ConfigurationSequencer {
    steps: Vec<SequenceStep>,
}

impl ConfigurationSequencer {
    /// The acquisition setup: `exposure_ms` first, then the configured values.
    ///
    /// Readout control mode is written twice, early and last, to the same value.
    pub fn new(exposure_ms: f64, config: &SequenceConfig) -> Self {
        let readout_mode = config.readout_control_mode.code();
        let steps = vec![
            SequenceStep::new(ParameterId::ExposureTime, exposure_ms),
            SequenceStep::new(ParameterId::AdcSpeed, config.adc_speed_mhz),
            SequenceStep::new(ParameterId::AdcAnalogGain, config.adc_analog_gain.code()),
            SequenceStep::new(ParameterId::CleanUntilTrigger, config.clean_until_trigger),
            SequenceStep::new(ParameterId::TriggerResponse, config.trigger_response.code()),
            SequenceStep::new(
                ParameterId::TriggerDetermination,
                config.trigger_determination.code(),
            ),
            SequenceStep::new(ParameterId::CleanCycleCount, config.clean_cycle_count),
            SequenceStep::new(
                ParameterId::CleanSectionFinalHeight,
                config.clean_section_final_height,
            ),
            SequenceStep::new(
                ParameterId::CleanSectionFinalHeightCount,
                config.clean_section_final_height_count,
            ),
            SequenceStep::new(
                ParameterId::SensorTemperatureSetPoint,
                config.sensor_temperature_setpoint_c,
            ),
            SequenceStep::new(ParameterId::ReadoutControlMode, readout_mode),
            SequenceStep::new(ParameterId::CleanCycleHeight, config.clean_cycle_height),
            SequenceStep::new(ParameterId::ReadoutControlMode, readout_mode),
        ];
        Self { steps }
    }

    /// A custom sequence.
    pub fn from_steps(steps: Vec<SequenceStep>) -> Self {
        Self { steps }
    }

    /// Steps in the order they run.
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Apply every step in order.
    pub fn run<D: CameraDevice + ?Sized>(
        &self,
        device: &D,
        policy: CommitPolicy,
    ) -> Result<SequenceReport, SequenceError> {
        tracing::info!(steps = self.steps.len(), ?policy, "Configuring camera");
        let mut report = SequenceReport::default();
        for (index, step) in self.steps.iter().enumerate() {
            let outcome = CommitEngine::try_set(device, step.parameter, step.value, policy)
                .map_err(|source| SequenceError::Aborted {
                    step: index,
                    source,
                })?;
            report.steps.push(outcome);
        }

        let failed = report.failed_steps().count();
        if failed == 0 {
            tracing::info!("Camera configured");
        } else {
            tracing::warn!(failed, "Camera configured with failures");
        }
        Ok(report)
    }
}
