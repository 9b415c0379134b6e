//! Stored reading data model.

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::protocol::Measurements;

/// One decoded sensor sample with its station metadata, as persisted.
///
/// `timestamp` is the intended sample time (the aligned minute the scheduler
/// fired for); `created_at` is when the row was actually written. Both are
/// epoch seconds. Rows are append-only and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Option<i64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub rain: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub device: String,
    pub timestamp: i64,
    pub created_at: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub location: String,
}

impl Reading {
    /// Stamps a decoded sample with the station's static metadata.
    pub fn from_measurements(
        config: &DeviceConfig,
        measurements: Measurements,
        timestamp: i64,
        created_at: i64,
    ) -> Self {
        Self {
            id: None,
            temperature: Some(measurements.temperature),
            humidity: Some(measurements.humidity),
            pressure: Some(measurements.pressure),
            wind_speed: Some(measurements.wind_speed),
            wind_direction: Some(measurements.wind_direction),
            rain: Some(measurements.rain),
            solar_radiation: Some(measurements.solar_radiation),
            device: config.device.clone(),
            timestamp,
            created_at,
            latitude: config.geo.latitude,
            longitude: config.geo.longitude,
            altitude: config.geo.altitude,
            location: config.location.clone(),
        }
    }
}
