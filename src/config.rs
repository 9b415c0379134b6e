//! Device configuration, loaded once at startup from a JSON file.
//!
//! Everything here is immutable for the process lifetime. Geo position and
//! location label are stamped onto each reading at write time, never
//! re-resolved later.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::SensorModel;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Retention knobs. Defaults match the deployed station: weekly backups kept
/// for a month, readings kept for thirteen months, maintenance between
/// midnight and one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub backup_every_days: i64,
    pub backup_keep_days: i64,
    pub data_keep_days: i64,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            backup_every_days: 7,
            backup_keep_days: 30,
            data_keep_days: 396,
            window_start_hour: 0,
            window_end_hour: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device: String,
    pub model: SensorModel,
    pub port: String,
    /// Acquisition cadence in minutes, aligned to wall-clock boundaries.
    pub interval_minutes: u32,
    pub geo: GeoPosition,
    pub location: String,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub state_path: PathBuf,
    /// Services paused for the duration of a backup cycle.
    pub services: Vec<String>,
    pub retention: RetentionConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: "unknown".into(),
            model: SensorModel::default(),
            port: "/dev/ttyS0".into(),
            interval_minutes: 5,
            geo: GeoPosition::default(),
            location: "unknown".into(),
            database_path: "/var/lib/wxstation/wxstation.sqlite".into(),
            backup_dir: "/var/lib/wxstation/backup".into(),
            state_path: "/var/lib/wxstation/backup_state.json".into(),
            services: vec!["wxstation.service".into(), "wxstation-api.service".into()],
            retention: RetentionConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 || self.interval_minutes > 60 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "interval_minutes must be within 1..=60, got {}",
                    self.interval_minutes
                ),
            });
        }
        // Samples must land on the same minutes every hour.
        if 60 % self.interval_minutes != 0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "interval_minutes must divide 60 evenly, got {}",
                    self.interval_minutes
                ),
            });
        }

        let retention = &self.retention;
        if retention.window_start_hour >= retention.window_end_hour
            || retention.window_end_hour > 24
        {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "maintenance window [{}, {}) is not a valid hour range",
                    retention.window_start_hour, retention.window_end_hour
                ),
            });
        }
        if retention.backup_every_days < 1
            || retention.backup_keep_days < 1
            || retention.data_keep_days < 1
        {
            return Err(ConfigError::Invalid {
                reason: "retention horizons must be at least one day".into(),
            });
        }

        Ok(())
    }
}
