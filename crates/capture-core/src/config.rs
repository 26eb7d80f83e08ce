//! Capture configuration.
//!
//! Configuration is layered with figment:
//!
//! 1. library defaults ([`CaptureConfig::default`])
//! 2. an optional TOML file
//! 3. environment variables prefixed `PICAM_CAPTURE_`, nested keys split on `__`
//!    (e.g. `PICAM_CAPTURE_SEQUENCE__CLEAN_CYCLE_HEIGHT=16`)
//! 4. command-line [`ConfigOverrides`]
//!
//! Validation runs once, on the merged result.
//!
//! ## Schema
//!
//! ```toml
//! log_level = "info"
//! log_format = "pretty"          # or "json"
//!
//! [demo_camera]
//! model = "Pixis1024BR"
//! serial_number = "12345"
//!
//! [sequence]
//! adc_speed_mhz = 2.0
//! adc_analog_gain = "high"
//! clean_until_trigger = true
//! trigger_response = "readout-per-trigger"
//! trigger_determination = "positive-polarity"
//! clean_cycle_count = 1
//! clean_section_final_height = 4
//! clean_section_final_height_count = 250
//! sensor_temperature_setpoint_c = -70.0
//! readout_control_mode = "full-frame"
//! clean_cycle_height = 8
//!
//! [commit_policy]
//! configure = "best-effort"
//! roi = "hard-stop"
//! ```

use crate::device::CameraModel;
use crate::parameter::{AdcAnalogGain, ReadoutControlMode, TriggerDetermination, TriggerResponse};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Smallest clean cycle height the sensor tolerates; lower values destabilize it.
pub const CLEAN_CYCLE_HEIGHT_FLOOR: i32 = 8;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PICAM_CAPTURE_";

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly named file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// A layer could not be parsed or has the wrong shape.
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// Values parsed but failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when a step of a parameter commit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitPolicy {
    /// Report the failure and keep going.
    BestEffort,
    /// Abort the operation on the first failure.
    HardStop,
}

/// Commit policy per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitPolicyConfig {
    /// Policy of the configuration sequence.
    pub configure: CommitPolicy,
    /// Policy of the ROI commit before acquisition.
    pub roi: CommitPolicy,
}

impl Default for CommitPolicyConfig {
    fn default() -> Self {
        Self {
            configure: CommitPolicy::BestEffort,
            roi: CommitPolicy::HardStop,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Simulated camera created when no hardware is connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoCameraConfig {
    /// Model reported by the demo camera.
    pub model: CameraModel,
    /// Serial number reported by the demo camera.
    pub serial_number: String,
}

impl Default for DemoCameraConfig {
    fn default() -> Self {
        Self {
            model: CameraModel::Pixis1024BR,
            serial_number: "12345".to_string(),
        }
    }
}

/// Values applied by the configuration sequence. Exposure time comes from the
/// command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// ADC speed in MHz.
    pub adc_speed_mhz: f64,
    /// ADC analog gain.
    pub adc_analog_gain: AdcAnalogGain,
    /// Keep cleaning the sensor while waiting for a trigger.
    pub clean_until_trigger: bool,
    /// Response to an external trigger.
    pub trigger_response: TriggerResponse,
    /// Trigger polarity or edge.
    pub trigger_determination: TriggerDetermination,
    /// Clean cycles before each exposure.
    pub clean_cycle_count: i32,
    /// Rows per final clean section.
    pub clean_section_final_height: i32,
    /// Number of final clean sections. Committed after the height.
    pub clean_section_final_height_count: i32,
    /// Sensor temperature set point, in degrees Celsius.
    pub sensor_temperature_setpoint_c: f64,
    /// Readout control mode.
    pub readout_control_mode: ReadoutControlMode,
    /// Must be at least [`CLEAN_CYCLE_HEIGHT_FLOOR`].
    pub clean_cycle_height: i32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            adc_speed_mhz: 2.0,
            adc_analog_gain: AdcAnalogGain::High,
            clean_until_trigger: true,
            trigger_response: TriggerResponse::ReadoutPerTrigger,
            trigger_determination: TriggerDetermination::PositivePolarity,
            clean_cycle_count: 1,
            clean_section_final_height: 4,
            clean_section_final_height_count: 250,
            sensor_temperature_setpoint_c: -70.0,
            readout_control_mode: ReadoutControlMode::FullFrame,
            clean_cycle_height: CLEAN_CYCLE_HEIGHT_FLOOR,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Default log filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Demo camera used when nothing is attached.
    pub demo_camera: DemoCameraConfig,
    /// Configuration sequence values.
    pub sequence: SequenceConfig,
    /// Commit failure handling.
    pub commit_policy: CommitPolicyConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            demo_camera: DemoCameraConfig::default(),
            sequence: SequenceConfig::default(),
            commit_policy: CommitPolicyConfig::default(),
        }
    }
}

impl Provider for CaptureConfig {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Library Defaults")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        Serialized::defaults(CaptureConfig::default()).data()
    }
}

/// Values given on the command line. Unset fields leave the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigOverrides {
    /// `--log-level`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// `--log-format`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
}

impl CaptureConfig {
    /// Load defaults, then `config_path` if given, then the environment.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(config_path, &ConfigOverrides::default())
    }

    /// [`CaptureConfig::load`] with `overrides` merged last, then validated.
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(CaptureConfig::default());

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides));

        let config: CaptureConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            return Err(ConfigError::Invalid(format!(
                "log_level '{}' is not a valid filter: {}",
                self.log_level, e
            )));
        }
        if self.demo_camera.serial_number.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "demo_camera.serial_number must not be empty".to_string(),
            ));
        }

        let sequence = &self.sequence;
        if sequence.clean_cycle_height < CLEAN_CYCLE_HEIGHT_FLOOR {
            return Err(ConfigError::Invalid(format!(
                "sequence.clean_cycle_height {} is below the safe floor of {}",
                sequence.clean_cycle_height, CLEAN_CYCLE_HEIGHT_FLOOR
            )));
        }
        for (name, value) in [
            ("sequence.adc_speed_mhz", sequence.adc_speed_mhz),
            (
                "sequence.sensor_temperature_setpoint_c",
                sequence.sensor_temperature_setpoint_c,
            ),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{} must be finite", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_the_reference_sequence() {
        let config = CaptureConfig::default();
        assert_eq!(config.sequence.adc_speed_mhz, 2.0);
        assert_eq!(config.sequence.adc_analog_gain, AdcAnalogGain::High);
        assert_eq!(config.sequence.clean_section_final_height_count, 250);
        assert_eq!(config.sequence.sensor_temperature_setpoint_c, -70.0);
        assert_eq!(config.sequence.clean_cycle_height, 8);
        assert_eq!(config.commit_policy.configure, CommitPolicy::BestEffort);
        assert_eq!(config.commit_policy.roi, CommitPolicy::HardStop);
        assert_eq!(config.demo_camera.model, CameraModel::Pixis1024BR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "capture.toml",
                r#"
                    log_level = "debug"

                    [sequence]
                    adc_analog_gain = "medium"
                    clean_cycle_height = 16

                    [commit_policy]
                    configure = "hard-stop"
                "#,
            )?;
            jail.set_env("PICAM_CAPTURE_SEQUENCE__CLEAN_CYCLE_HEIGHT", "32");
            jail.set_env("PICAM_CAPTURE_DEMO_CAMERA__SERIAL_NUMBER", "CI-1");

            let config = CaptureConfig::load(Some(Path::new("capture.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.sequence.adc_analog_gain, AdcAnalogGain::Medium);
            assert_eq!(config.sequence.clean_cycle_height, 32);
            assert_eq!(config.commit_policy.configure, CommitPolicy::HardStop);
            assert_eq!(config.commit_policy.roi, CommitPolicy::HardStop);
            assert_eq!(config.demo_camera.serial_number, "CI-1");
            // untouched keys keep their defaults
            assert_eq!(config.sequence.clean_section_final_height, 4);
            Ok(())
        });
    }

    #[test]
    fn clean_cycle_height_below_floor_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PICAM_CAPTURE_SEQUENCE__CLEAN_CYCLE_HEIGHT", "4");
            match CaptureConfig::load(None) {
                Err(ConfigError::Invalid(message)) => {
                    assert!(message.contains("clean_cycle_height"));
                }
                other => panic!("expected Invalid, got {:?}", other),
            }
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let result = CaptureConfig::load(Some(Path::new("nope.toml")));
            assert!(matches!(result, Err(ConfigError::NotFound(_))));
            Ok(())
        });
    }

    #[test]
    fn unknown_enum_value_fails_extraction() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.toml", "[sequence]\nadc_analog_gain = \"loud\"\n")?;
            let result = CaptureConfig::load(Some(Path::new("bad.toml")));
            assert!(matches!(result, Err(ConfigError::Extract(_))));
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_non_finite_and_empty_serial() {
        let mut config = CaptureConfig::default();
        config.sequence.adc_speed_mhz = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CaptureConfig::default();
        config.demo_camera.serial_number = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CaptureConfig::default();
        config.log_level = "capture=loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn log_level_accepts_filter_directives() {
        let mut config = CaptureConfig::default();
        config.log_level = "warn,capture_driver_picam=debug".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_are_merged_before_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("capture.toml", "log_level = \"capture=loud\"\n")?;
            let path = Path::new("capture.toml");
            assert!(matches!(
                CaptureConfig::load(Some(path)),
                Err(ConfigError::Invalid(_))
            ));

            jail.set_env("PICAM_CAPTURE_LOG_FORMAT", "pretty");
            let overrides = ConfigOverrides {
                log_level: Some("debug".into()),
                log_format: Some(LogFormat::Json),
            };
            let config = CaptureConfig::load_with_overrides(Some(path), &overrides)
                .map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.log_format, LogFormat::Json);
            Ok(())
        });
    }
}
