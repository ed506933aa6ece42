//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use glucowatch_core::{DispatcherConfig, SensorPolicy, ThresholdConfig};

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sensor policy and scheduling.
    pub sensor: SensorConfig,
    /// Glucose alert settings.
    pub alerts: AlertsConfig,
    /// Remote status mirror.
    pub mirror: MirrorConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Storage path is not empty
    /// - Sensor wear duration, warning window and battery threshold are sane
    /// - Glucose thresholds are finite, positive and ordered
    /// - Mirror URL is http(s) and the timeout is within bounds
    ///
    /// # Example
    ///
    /// ```
    /// use glucowatch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.sensor.validate());
        errors.extend(self.alerts.validate());
        errors.extend(self.mirror.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: glucowatch_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Maximum tick interval in seconds (1 hour).
pub const MAX_TICK_INTERVAL: u64 = 3600;

/// Sensor policy and scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// User the sensor is registered to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Seconds between status recomputations in `run` mode (0 disables).
    pub tick_interval_secs: u64,
    /// Days a sensor can be worn.
    pub wear_days: u32,
    /// Hours before expiration that count as expiring soon.
    pub expiring_soon_hours: u32,
    /// Battery percentage below which the battery is low.
    pub low_battery_threshold: u8,
    /// Minutes in which repeat alerts of one kind are suppressed.
    pub dedup_window_mins: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let policy = SensorPolicy::default();
        Self {
            user_id: None,
            tick_interval_secs: 60,
            wear_days: policy.wear_days,
            expiring_soon_hours: policy.expiring_soon_hours,
            low_battery_threshold: policy.low_battery_threshold,
            dedup_window_mins: policy.dedup_window_mins,
        }
    }
}

impl SensorConfig {
    /// The engine policy described by this section.
    pub fn policy(&self) -> SensorPolicy {
        SensorPolicy {
            wear_days: self.wear_days,
            expiring_soon_hours: self.expiring_soon_hours,
            low_battery_threshold: self.low_battery_threshold,
            dedup_window_mins: self.dedup_window_mins,
            ..SensorPolicy::default()
        }
    }

    /// Validate sensor configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(user_id) = &self.user_id
            && user_id.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "sensor.user_id",
                "user id cannot be empty (omit it instead)",
            ));
        }

        if self.tick_interval_secs > MAX_TICK_INTERVAL {
            errors.push(ValidationError::new(
                "sensor.tick_interval_secs",
                format!(
                    "tick interval {} is too long (maximum {} seconds / 1 hour)",
                    self.tick_interval_secs, MAX_TICK_INTERVAL
                ),
            ));
        }

        if self.wear_days == 0 {
            errors.push(ValidationError::new(
                "sensor.wear_days",
                "wear duration must be at least 1 day",
            ));
        } else if u64::from(self.expiring_soon_hours) >= u64::from(self.wear_days) * 24 {
            errors.push(ValidationError::new(
                "sensor.expiring_soon_hours",
                format!(
                    "warning window of {} hours must be shorter than the {}-day wear duration",
                    self.expiring_soon_hours, self.wear_days
                ),
            ));
        }

        if !(1..=100).contains(&self.low_battery_threshold) {
            errors.push(ValidationError::new(
                "sensor.low_battery_threshold",
                format!(
                    "threshold {} must be between 1 and 100",
                    self.low_battery_threshold
                ),
            ));
        }

        if self.dedup_window_mins == 0 {
            errors.push(ValidationError::new(
                "sensor.dedup_window_mins",
                "de-duplication window must be at least 1 minute",
            ));
        }

        errors
    }
}

/// Glucose alert settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Readings above this value (mg/dL) are high.
    pub high_threshold: f64,
    /// Readings below this value (mg/dL) are low.
    pub low_threshold: f64,
    /// Play the alert sound. When false, alerts only vibrate.
    pub audio: bool,
    /// Alert sound resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_resource: Option<String>,
    /// Alert volume in `0.0..=1.0`.
    pub volume: f32,
    /// Vibration pattern (alternating off/on milliseconds).
    pub vibration_pattern_ms: Vec<u64>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let thresholds = ThresholdConfig::default();
        let dispatcher = DispatcherConfig::default();
        Self {
            high_threshold: thresholds.high,
            low_threshold: thresholds.low,
            audio: dispatcher.audio_resource.is_some(),
            audio_resource: dispatcher.audio_resource,
            volume: dispatcher.volume,
            vibration_pattern_ms: dispatcher.vibration_pattern,
        }
    }
}

impl AlertsConfig {
    /// Threshold configuration for the reading alert engine.
    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            high: self.high_threshold,
            low: self.low_threshold,
        }
    }

    /// Notification dispatcher configuration.
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            audio_resource: self
                .audio
                .then(|| self.audio_resource.clone())
                .flatten(),
            volume: self.volume,
            vibration_pattern: self.vibration_pattern_ms.clone(),
        }
    }

    /// Validate alert configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.high_threshold.is_finite() || !self.low_threshold.is_finite() {
            errors.push(ValidationError::new(
                "alerts",
                "glucose thresholds must be finite numbers",
            ));
        } else {
            if self.low_threshold <= 0.0 {
                errors.push(ValidationError::new(
                    "alerts.low_threshold",
                    format!("low threshold {} must be positive", self.low_threshold),
                ));
            }
            if self.low_threshold >= self.high_threshold {
                errors.push(ValidationError::new(
                    "alerts.high_threshold",
                    format!(
                        "high threshold {} must be above low threshold {}",
                        self.high_threshold, self.low_threshold
                    ),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.volume) {
            errors.push(ValidationError::new(
                "alerts.volume",
                format!("volume {} must be between 0.0 and 1.0", self.volume),
            ));
        }

        if self.audio
            && let Some(resource) = &self.audio_resource
            && resource.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "alerts.audio_resource",
                "audio resource cannot be empty (set `audio = false` for vibration only)",
            ));
        }

        errors
    }
}

/// Minimum mirror timeout in seconds.
pub const MIN_MIRROR_TIMEOUT: u64 = 1;
/// Maximum mirror timeout in seconds.
pub const MAX_MIRROR_TIMEOUT: u64 = 300;

/// Remote status mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Base URL of the mirror API. Mirroring is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

impl MirrorConfig {
    /// Validate mirror configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            errors.push(ValidationError::new(
                "mirror.url",
                format!("invalid URL '{}': must start with http:// or https://", url),
            ));
        }

        if !(MIN_MIRROR_TIMEOUT..=MAX_MIRROR_TIMEOUT).contains(&self.timeout_secs) {
            errors.push(ValidationError::new(
                "mirror.timeout_secs",
                format!(
                    "timeout {} must be between {} and {} seconds",
                    self.timeout_secs, MIN_MIRROR_TIMEOUT, MAX_MIRROR_TIMEOUT
                ),
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `sensor.wear_days`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("glucowatch")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.path, glucowatch_store::default_db_path());
        assert_eq!(config.sensor.wear_days, 14);
        assert_eq!(config.sensor.tick_interval_secs, 60);
        assert_eq!(config.alerts.high_threshold, 180.0);
        assert_eq!(config.alerts.low_threshold, 70.0);
        assert!(config.mirror.url.is_none());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_sections_map_to_engine_config() {
        let config = Config::default();
        assert_eq!(config.sensor.policy(), SensorPolicy::default());
        assert_eq!(config.alerts.thresholds(), ThresholdConfig::default());
        assert_eq!(config.alerts.dispatcher(), DispatcherConfig::default());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [storage]
            path = "/data/glucowatch.db"

            [sensor]
            user_id = "u1"
            tick_interval_secs = 30
            wear_days = 10
            low_battery_threshold = 20

            [alerts]
            high_threshold = 250.0
            low_threshold = 60.0
            audio_resource = "siren.wav"
            vibration_pattern_ms = [0, 1000]

            [mirror]
            url = "https://mirror.example.com/api"
            timeout_secs = 5
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/data/glucowatch.db"));
        assert_eq!(config.sensor.user_id.as_deref(), Some("u1"));
        assert_eq!(config.sensor.wear_days, 10);
        assert_eq!(config.sensor.expiring_soon_hours, 24);
        assert_eq!(config.alerts.high_threshold, 250.0);
        assert_eq!(config.alerts.volume, 1.0);
        assert_eq!(config.alerts.vibration_pattern_ms, vec![0, 1000]);
        assert_eq!(
            config.mirror.url.as_deref(),
            Some("https://mirror.example.com/api")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_audio_can_be_turned_off() {
        let config: Config = toml::from_str(
            r#"
            [alerts]
            audio = false
            "#,
        )
        .unwrap();
        assert!(!config.alerts.audio);
        assert_eq!(config.alerts.audio_resource.as_deref(), Some("alarm.mp3"));
        assert_eq!(config.alerts.dispatcher().audio_resource, None);

        let silent_empty = AlertsConfig {
            audio: false,
            audio_resource: Some(String::new()),
            ..AlertsConfig::default()
        };
        assert!(silent_empty.validate().is_empty());

        let defaults: Config = toml::from_str("[alerts]").unwrap();
        assert!(defaults.alerts.audio);
        assert_eq!(
            defaults.alerts.dispatcher().audio_resource.as_deref(),
            Some("alarm.mp3")
        );
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.sensor.user_id = Some("u1".to_string());
        config.mirror.url = Some("http://localhost:8080".to_string());

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_validated_rejects_bad_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[sensor]\nwear_days = 0\n").unwrap();

        let result = Config::load_validated(&config_path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("glucowatch/config.toml"));
    }

    #[test]
    fn test_sensor_validation() {
        let config = SensorConfig {
            user_id: Some("  ".to_string()),
            tick_interval_secs: MAX_TICK_INTERVAL + 1,
            wear_days: 1,
            expiring_soon_hours: 24,
            low_battery_threshold: 0,
            dedup_window_mins: 0,
        };
        let errors = config.validate();
        assert_eq!(
            field_errors(&errors),
            vec![
                "sensor.user_id",
                "sensor.tick_interval_secs",
                "sensor.expiring_soon_hours",
                "sensor.low_battery_threshold",
                "sensor.dedup_window_mins",
            ]
        );

        let zero_wear = SensorConfig {
            wear_days: 0,
            ..SensorConfig::default()
        };
        assert_eq!(field_errors(&zero_wear.validate()), vec!["sensor.wear_days"]);

        let disabled_ticks = SensorConfig {
            tick_interval_secs: 0,
            ..SensorConfig::default()
        };
        assert!(disabled_ticks.validate().is_empty());
    }

    #[test]
    fn test_alerts_validation() {
        let inverted = AlertsConfig {
            high_threshold: 60.0,
            low_threshold: 70.0,
            ..AlertsConfig::default()
        };
        assert_eq!(field_errors(&inverted.validate()), vec!["alerts.high_threshold"]);

        let nan = AlertsConfig {
            high_threshold: f64::NAN,
            ..AlertsConfig::default()
        };
        assert_eq!(field_errors(&nan.validate()), vec!["alerts"]);

        let loud = AlertsConfig {
            volume: 1.5,
            audio_resource: Some(String::new()),
            ..AlertsConfig::default()
        };
        assert_eq!(
            field_errors(&loud.validate()),
            vec!["alerts.volume", "alerts.audio_resource"]
        );
    }

    #[test]
    fn test_mirror_validation() {
        let bad = MirrorConfig {
            url: Some("ftp://example.com".to_string()),
            timeout_secs: 0,
        };
        assert_eq!(
            field_errors(&bad.validate()),
            vec!["mirror.url", "mirror.timeout_secs"]
        );
        assert!(MirrorConfig::default().validate().is_empty());
    }

    #[test]
    fn test_config_validation_error_display() {
        let mut config = Config::default();
        config.storage.path = PathBuf::new();
        config.sensor.wear_days = 0;

        let err = config.validate().unwrap_err();
        let display = err.to_string();
        assert!(display.contains("Configuration validation failed"));
        assert!(display.contains("storage.path"));
        assert!(display.contains("sensor.wear_days"));
    }
}
