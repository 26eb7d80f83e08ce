//! Integration tests for the commit engine and configuration sequencer
//!
//! Runs against the simulated demo camera:
//! - commit idempotence (no commit, no hardware write)
//! - partial commit (rejected parameter keeps its value)
//! - below-minimum values
//! - best-effort continuation vs hard stop

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use capture_core::{
    CameraDevice, CommitPolicy, ParameterId, ParameterValue, SequenceConfig,
};
use capture_driver_picam::{
    CommitEngine, CommitError, CommitOutcome, CommitStep, ConfigurationSequencer, SequenceError,
    SequenceStep,
};
use common::{disconnected, open, pixis};

// =============================================================================
// Commit Idempotence
// =============================================================================

mod idempotence {
    use super::*;

    #[test]
    fn unchanged_value_performs_no_hardware_write() {
        let (camera, inspector) = open(pixis());
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::ExposureTime,
            ParameterValue::Float(50.0),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.outcome, CommitOutcome::AlreadyCommitted);
        assert_eq!(inspector.commit_calls(), 0);
        assert_eq!(inspector.hardware_writes(), 0);
        assert!(report.is_clean());
    }

    #[test]
    fn second_identical_set_is_already_committed() {
        let (camera, inspector) = open(pixis());
        for expected in [CommitOutcome::Committed, CommitOutcome::AlreadyCommitted] {
            let report = CommitEngine::try_set(
                &camera,
                ParameterId::SensorTemperatureSetPoint,
                ParameterValue::Float(-70.0),
                CommitPolicy::HardStop,
            )
            .unwrap();
            assert_eq!(report.outcome, expected);
        }
        assert_eq!(inspector.commit_calls(), 1);
        assert_eq!(inspector.hardware_writes(), 1);
    }
}

// =============================================================================
// Partial Commit
// =============================================================================

mod partial_commit {
    use super::*;

    #[test]
    fn only_the_rejected_parameter_keeps_its_prior_value() {
        let (camera, inspector) = open(pixis().reject_on_commit(ParameterId::TriggerResponse));

        // stage N = 3 values, the third through the engine
        camera
            .set_value(ParameterId::AdcAnalogGain, ParameterValue::Integer(3))
            .unwrap();
        camera
            .set_value(ParameterId::TriggerResponse, ParameterValue::Integer(2))
            .unwrap();
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::CleanCycleCount,
            ParameterValue::Integer(5),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.failed, vec![ParameterId::TriggerResponse]);
        assert_eq!(
            inspector.committed_value(ParameterId::TriggerResponse),
            Some(ParameterValue::Integer(1))
        );
        assert_eq!(
            inspector.committed_value(ParameterId::AdcAnalogGain),
            Some(ParameterValue::Integer(3))
        );
        assert_eq!(
            inspector.committed_value(ParameterId::CleanCycleCount),
            Some(ParameterValue::Integer(5))
        );
        // the device stays usable
        assert!(camera.are_parameters_committed().unwrap());
        assert_eq!(inspector.outstanding_objects(), 0);
    }
}

// =============================================================================
// Invalid Values
// =============================================================================

mod invalid_values {
    use super::*;

    #[test]
    fn below_minimum_exposure_is_not_reported_as_applied() {
        let (camera, inspector) = open(pixis());
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::ExposureTime,
            ParameterValue::Float(-0.5),
            CommitPolicy::BestEffort,
        )
        .unwrap();

        assert_eq!(report.settable, Some(false));
        assert_eq!(inspector.counters().set_calls, 1);
        assert_eq!(report.errors[0].step, CommitStep::Set);
        assert_ne!(report.confirmed, Some(ParameterValue::Float(-0.5)));
        assert!(!report.took_effect());
        assert_eq!(inspector.hardware_writes(), 0);
    }

    #[test]
    fn off_increment_value_is_rejected() {
        let (camera, _inspector) = open(pixis());
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::SensorTemperatureSetPoint,
            ParameterValue::Float(-70.5),
            CommitPolicy::BestEffort,
        )
        .unwrap();
        assert_eq!(report.settable, Some(false));
        assert!(!report.took_effect());
    }

    #[test]
    fn recommended_constraint_never_rejects() {
        // 0.1 MHz is outside the recommended set but legal
        let (camera, _inspector) = open(pixis());
        let report = CommitEngine::try_set(
            &camera,
            ParameterId::AdcSpeed,
            ParameterValue::Float(0.1),
            CommitPolicy::HardStop,
        )
        .unwrap();
        assert_eq!(report.settable, Some(true));
        assert!(report.took_effect());
        let constraints = report.constraints.unwrap();
        assert!(!constraints.recommended.admits(0.1));
        assert!(constraints.required.admits(0.1));
    }
}

// =============================================================================
// Configuration Sequencer
// =============================================================================

mod sequencer {
    use super::*;

    #[test]
    fn values_are_written_in_sequence_order() {
        let (camera, inspector) = open(pixis());
        let sequencer = ConfigurationSequencer::new(100.0, &SequenceConfig::default());
        sequencer.run(&camera, CommitPolicy::BestEffort).unwrap();

        let written: Vec<(ParameterId, ParameterValue)> = inspector.set_history();
        let expected: Vec<(ParameterId, ParameterValue)> = sequencer
            .steps()
            .iter()
            .map(|step| (step.parameter, step.value))
            .collect();
        assert_eq!(written, expected);
        assert_eq!(
            inspector.committed_value(ParameterId::ExposureTime),
            Some(ParameterValue::Float(100.0))
        );
    }

    #[test]
    fn best_effort_continues_past_a_failed_step() {
        let (camera, inspector) = open(pixis());
        camera.fail_parameter("set_value", ParameterId::AdcAnalogGain, disconnected());
        let report = ConfigurationSequencer::new(10.0, &SequenceConfig::default())
            .run(&camera, CommitPolicy::BestEffort)
            .unwrap();

        assert_eq!(report.steps.len(), 13);
        let failed: Vec<ParameterId> = report.failed_steps().map(|r| r.parameter).collect();
        assert_eq!(failed, vec![ParameterId::AdcAnalogGain]);
        // later steps still applied
        assert_eq!(
            inspector.committed_value(ParameterId::CleanCycleHeight),
            Some(ParameterValue::Integer(8))
        );
    }

    #[test]
    fn hard_stop_aborts_at_the_failing_step() {
        let (camera, inspector) = open(pixis());
        camera.fail_parameter("set_value", ParameterId::AdcAnalogGain, disconnected());
        let err = ConfigurationSequencer::new(10.0, &SequenceConfig::default())
            .run(&camera, CommitPolicy::HardStop)
            .unwrap_err();

        let SequenceError::Aborted { step, source } = err;
        assert_eq!(step, 2);
        assert!(matches!(
            source,
            CommitError::Set {
                parameter: ParameterId::AdcAnalogGain,
                ..
            }
        ));
        // nothing after the failing step was attempted
        assert_eq!(inspector.set_history().len(), 3);
        assert_eq!(
            inspector.committed_value(ParameterId::CleanCycleHeight),
            Some(ParameterValue::Integer(16))
        );
    }

    #[test]
    fn steps_that_depend_on_earlier_commits_succeed_in_order() {
        let (camera, _inspector) = open(pixis());
        let report = ConfigurationSequencer::from_steps(vec![
            SequenceStep::new(ParameterId::CleanSectionFinalHeight, 4),
            SequenceStep::new(ParameterId::CleanSectionFinalHeightCount, 256),
        ])
        .run(&camera, CommitPolicy::HardStop)
        .unwrap();
        assert!(report.is_clean());

        // 257 exceeds 1024 / 4 and is refused at set time
        let report = ConfigurationSequencer::from_steps(vec![SequenceStep::new(
            ParameterId::CleanSectionFinalHeightCount,
            257,
        )])
        .run(&camera, CommitPolicy::BestEffort)
        .unwrap();
        assert_eq!(report.steps[0].settable, Some(false));
    }
}
