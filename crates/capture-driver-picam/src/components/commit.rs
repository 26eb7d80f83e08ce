//! PICam Parameter Commit
//!
//! `CommitEngine::try_set` drives one parameter through the SDK's
//! stage-then-commit protocol:
//!
//! 1. read the current and default values
//! 2. ask whether the parameter is readable
//! 3. fetch and release its required/recommended constraints
//! 4. ask whether the candidate value can be set
//! 5. set (stage) the value, even when step 4 said no
//! 6. skip the commit if nothing is staged
//! 7. otherwise commit, collecting the parameters the device rejected
//! 8. read the value back
//!
//! Steps 1-4 and 8 are informational. Under [`CommitPolicy::BestEffort`] every
//! failure is recorded in the [`CommitReport`] and the remaining steps still
//! run. Under [`CommitPolicy::HardStop`] a failure of step 5, 6 or 7, or a
//! non-empty rejected list, aborts with a [`CommitError`].

use crate::components::constraints::{ConstraintResolver, ConstraintSet};
use crate::components::release::ReleaseGuard;
use crate::error::{CommitError, StepError};
use capture_core::{CameraDevice, CommitPolicy, DeviceError, ParameterId, ParameterValue};
use std::fmt;

/// One step of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    /// Read the current value.
    ReadValue,
    /// Read the default value.
    ReadDefault,
    /// Query whether the parameter is readable.
    CanRead,
    /// Resolve required and recommended constraints.
    Constraints,
    /// Query whether the value may be set.
    CanSet,
    /// Stage the value.
    Set,
    /// Query whether anything is staged.
    CommitStatus,
    /// Commit staged values.
    Commit,
    /// Read the value after the commit.
    ReadBack,
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommitStep::ReadValue => "read value",
            CommitStep::ReadDefault => "read default value",
            CommitStep::CanRead => "query readability",
            CommitStep::Constraints => "fetch constraints",
            CommitStep::CanSet => "query settability",
            CommitStep::Set => "set value",
            CommitStep::CommitStatus => "query commit status",
            CommitStep::Commit => "commit",
            CommitStep::ReadBack => "read back",
        };
        f.write_str(label)
    }
}

/// A failed step, kept for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    /// Step that failed.
    pub step: CommitStep,
    /// Why it failed.
    pub error: StepError,
}

/// What happened at the commit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing was staged; no commit was issued.
    AlreadyCommitted,
    /// A device-wide commit was issued.
    Committed,
    /// The commit call itself failed.
    CommitFailed,
}

/// Everything observed while setting one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    /// Parameter being set.
    pub parameter: ParameterId,
    /// Value asked for.
    pub requested: ParameterValue,
    /// Value before the set, if it could be read.
    pub previous: Option<ParameterValue>,
    /// Device default, if it could be read.
    pub default: Option<ParameterValue>,
    /// Answer of the can-read query.
    pub readable: Option<bool>,
    /// Constraints resolved before the set.
    pub constraints: Option<ConstraintSet>,
    /// Answer of the can-set query. `Some(false)` still attempts the set.
    pub settable: Option<bool>,
    /// The set call succeeded (the value was staged or already current).
    pub staged: bool,
    /// Result of the commit stage.
    pub outcome: CommitOutcome,
    /// Parameters the device rejected during the commit.
    pub failed: Vec<ParameterId>,
    /// Value read back after the commit stage.
    pub confirmed: Option<ParameterValue>,
    /// Every failed step, in order.
    pub errors: Vec<StepFailure>,
}

impl CommitReport {
    fn new(parameter: ParameterId, requested: ParameterValue) -> Self {
        Self {
            parameter,
            requested,
            previous: None,
            default: None,
            readable: None,
            constraints: None,
            settable: None,
            staged: false,
            outcome: CommitOutcome::AlreadyCommitted,
            failed: Vec::new(),
            confirmed: None,
            errors: Vec::new(),
        }
    }

    /// The read-back value equals the requested value.
    pub fn took_effect(&self) -> bool {
        self.confirmed == Some(self.requested)
    }

    /// No step failed and nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.failed.is_empty()
    }

    fn record(&mut self, step: CommitStep, error: impl Into<StepError>) {
        let error = error.into();
        tracing::warn!(
            parameter = %self.parameter,
            %step,
            code = error.code(),
            "Failed to {}: {}",
            step,
            error
        );
        self.errors.push(StepFailure { step, error });
    }
}

/// Runs the stage-then-commit protocol for single parameters.
pub struct CommitEngine;

impl CommitEngine {
    /// Set `parameter` to `value` and commit it.
    pub fn try_set<D: CameraDevice + ?Sized>(
        device: &D,
        parameter: ParameterId,
        value: ParameterValue,
        policy: CommitPolicy,
    ) -> Result<CommitReport, CommitError> {
        let mut report = CommitReport::new(parameter, value);
        let hard_stop = policy == CommitPolicy::HardStop;

        match device.get_value(parameter) {
            Ok(previous) => report.previous = Some(previous),
            Err(e) => report.record(CommitStep::ReadValue, e),
        }
        match device.get_default_value(parameter) {
            Ok(default) => report.default = Some(default),
            Err(e) => report.record(CommitStep::ReadDefault, e),
        }
        tracing::debug!(
            %parameter,
            previous = ?report.previous,
            default = ?report.default,
            "Current value"
        );

        match device.can_read(parameter) {
            Ok(readable) => report.readable = Some(readable),
            Err(e) => report.record(CommitStep::CanRead, e),
        }

        match ConstraintResolver::fetch_both(device, parameter) {
            Ok(constraints) => report.constraints = Some(constraints),
            Err(e) => report.record(CommitStep::Constraints, e),
        }

        match device.can_set(parameter, value) {
            Ok(settable) => {
                if !settable {
                    tracing::warn!(%parameter, %value, "Device reports value cannot be set");
                }
                report.settable = Some(settable);
            }
            Err(e) => report.record(CommitStep::CanSet, e),
        }

        tracing::info!(%parameter, %value, "Setting parameter");
        match device.set_value(parameter, value) {
            Ok(()) => report.staged = true,
            Err(e) => {
                if hard_stop {
                    return Err(Self::abort(CommitError::Set {
                        parameter,
                        source: e,
                    }));
                }
                report.record(CommitStep::Set, e);
            }
        }

        let committed = match device.are_parameters_committed() {
            Ok(committed) => committed,
            Err(e) => {
                if hard_stop {
                    return Err(Self::abort(CommitError::StatusQuery {
                        parameter,
                        source: e,
                    }));
                }
                report.record(CommitStep::CommitStatus, e);
                // unknown status: commit anyway
                false
            }
        };

        if committed {
            tracing::debug!(%parameter, "Parameters already committed");
            report.outcome = CommitOutcome::AlreadyCommitted;
        } else {
            match Self::commit(device) {
                Ok(failed) => {
                    report.outcome = CommitOutcome::Committed;
                    for rejected in &failed {
                        tracing::warn!(%parameter, failed = %rejected, "Parameter rejected by commit");
                    }
                    report.failed = failed;
                }
                Err(e) => {
                    if hard_stop {
                        return Err(Self::abort(CommitError::CommitCall {
                            parameter,
                            source: e,
                        }));
                    }
                    report.outcome = CommitOutcome::CommitFailed;
                    report.record(CommitStep::Commit, e);
                }
            }
            if hard_stop && !report.failed.is_empty() {
                return Err(Self::abort(CommitError::Rejected {
                    parameter,
                    failed: report.failed,
                }));
            }
        }

        match device.get_value(parameter) {
            Ok(confirmed) => report.confirmed = Some(confirmed),
            Err(e) => report.record(CommitStep::ReadBack, e),
        }
        tracing::info!(
            %parameter,
            confirmed = ?report.confirmed,
            outcome = ?report.outcome,
            "Parameter set"
        );

        Ok(report)
    }

    /// Commit every staged value and return the rejected parameters.
    pub fn commit<D: CameraDevice + ?Sized>(device: &D) -> Result<Vec<ParameterId>, DeviceError> {
        let failed = ReleaseGuard::wrap(device, device.commit_parameters())?;
        Ok(failed.to_vec())
    }

    fn abort(error: CommitError) -> CommitError {
        tracing::error!(parameter = %error.parameter(), "{}", error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedCamera;
    use capture_core::{CameraModel, ConstraintDescriptor};
    use tracing_test::traced_test;

    fn pixis() -> SimulatedCamera {
        SimulatedCamera::builder(CameraModel::Pixis1024BR).build()
    }

    #[test]
    fn in_range_value_is_committed_and_confirmed() {
        let camera = pixis();
        let inspector = camera.inspector();
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::ExposureTime,
            ParameterValue::Float(12.5),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.previous, Some(ParameterValue::Float(50.0)));
        assert_eq!(report.default, Some(ParameterValue::Float(50.0)));
        assert_eq!(report.readable, Some(false));
        assert_eq!(report.settable, Some(true));
        assert!(report.staged);
        assert_eq!(report.outcome, CommitOutcome::Committed);
        assert!(report.took_effect());
        assert!(report.is_clean());
        assert!(matches!(
            report.constraints.as_ref().map(|c| &c.required),
            Some(ConstraintDescriptor::Range(_))
        ));
        assert_eq!(inspector.commit_calls(), 1);
        assert_eq!(inspector.hardware_writes(), 1);
        assert_eq!(inspector.outstanding_objects(), 0);
    }

    #[test]
    fn unchanged_value_skips_the_commit() {
        let camera = pixis();
        let inspector = camera.inspector();
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::AdcAnalogGain,
            ParameterValue::Integer(2),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.outcome, CommitOutcome::AlreadyCommitted);
        assert!(report.took_effect());
        assert_eq!(inspector.commit_calls(), 0);
        assert_eq!(inspector.hardware_writes(), 0);
    }

    #[test]
    #[traced_test]
    fn below_minimum_value_is_attempted_but_not_applied() {
        let camera = pixis();
        let inspector = camera.inspector();
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::ExposureTime,
            ParameterValue::Float(-5.0),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.settable, Some(false));
        // the set is still attempted
        assert_eq!(
            inspector.set_history(),
            vec![(ParameterId::ExposureTime, ParameterValue::Float(-5.0))]
        );
        assert!(!report.staged);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].step, CommitStep::Set);
        assert_eq!(report.confirmed, Some(ParameterValue::Float(50.0)));
        assert!(!report.took_effect());
        assert!(logs_contain("Device reports value cannot be set"));
    }

    #[test]
    fn every_grid_value_is_settable() {
        let camera = pixis();
        for height in (1..=1024).step_by(61) {
            let report = CommitEngine::try_set(
                &camera,
                ParameterId::CleanCycleHeight,
                ParameterValue::Integer(height),
                CommitPolicy::BestEffort,
            )
            .unwrap();
            assert_eq!(report.settable, Some(true), "height {}", height);
            assert!(report.took_effect());
        }
    }

    #[test]
    fn rejected_parameter_keeps_prior_value() {
        let camera = SimulatedCamera::builder(CameraModel::Pixis1024BR)
            .reject_on_commit(ParameterId::AdcAnalogGain)
            .build();
        let inspector = camera.inspector();
        // stage two values, commit through the engine on the second
        camera
            .set_value(ParameterId::ExposureTime, ParameterValue::Float(20.0))
            .unwrap();
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::AdcAnalogGain,
            ParameterValue::Integer(3),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.failed, vec![ParameterId::AdcAnalogGain]);
        assert_eq!(report.confirmed, Some(ParameterValue::Integer(2)));
        assert_eq!(
            inspector.committed_value(ParameterId::ExposureTime),
            Some(ParameterValue::Float(20.0))
        );
        assert_eq!(inspector.outstanding_objects(), 0);
    }

    #[test]
    fn hard_stop_turns_rejection_into_error() {
        let camera = SimulatedCamera::builder(CameraModel::Pixis1024BR)
            .reject_on_commit(ParameterId::AdcAnalogGain)
            .build();
        let err = CommitEngine::try_set(
            &camera,
            ParameterId::AdcAnalogGain,
            ParameterValue::Integer(3),
            CommitPolicy::HardStop,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CommitError::Rejected {
                parameter: ParameterId::AdcAnalogGain,
                failed: vec![ParameterId::AdcAnalogGain],
            }
        );
        assert_eq!(camera.inspector().outstanding_objects(), 0);
    }

    #[test]
    fn hard_stop_aborts_before_commit_on_set_failure() {
        let camera = pixis();
        let inspector = camera.inspector();
        let err = CommitEngine::try_set(
            &camera,
            ParameterId::AdcSpeed,
            ParameterValue::Float(7.0),
            CommitPolicy::HardStop,
        )
        .unwrap_err();
        assert!(matches!(err, CommitError::Set { .. }));
        assert_eq!(inspector.commit_calls(), 0);
    }

    #[test]
    fn best_effort_records_every_failing_step() {
        let camera = pixis();
        camera.fail_operation("get_default_value", DeviceError::Disconnected);
        camera.fail_operation("can_read", DeviceError::Disconnected);
        camera.fail_operation("commit_parameters", DeviceError::Disconnected);

        let report = CommitEngine::try_set(
            &camera,
            ParameterId::CleanCycleCount,
            ParameterValue::Integer(3),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        let steps: Vec<CommitStep> = report.errors.iter().map(|f| f.step).collect();
        assert_eq!(
            steps,
            vec![CommitStep::ReadDefault, CommitStep::CanRead, CommitStep::Commit]
        );
        assert_eq!(report.outcome, CommitOutcome::CommitFailed);
        // value read back through staging
        assert_eq!(report.confirmed, Some(ParameterValue::Integer(3)));
        assert!(report.errors.iter().all(|f| f.error.code() == Some(10)));
    }

    #[test]
    fn unknown_commit_status_still_commits() {
        let camera = pixis();
        let inspector = camera.inspector();
        camera.fail_operation("are_parameters_committed", DeviceError::Disconnected);
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::TriggerResponse,
            ParameterValue::Integer(2),
            CommitPolicy::BestEffort,
        )
        .unwrap();
        assert_eq!(report.outcome, CommitOutcome::Committed);
        assert!(report.took_effect());
        assert_eq!(inspector.commit_calls(), 1);
    }
}
