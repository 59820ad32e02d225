//! Sensor data model and validation
//!
//! One push of the `sensorData` subscription is a [`SensorSnapshot`] covering
//! every device. A snapshot is only shown if every device carries a
//! temperature and a humidity reading within the accepted ranges.

use std::ops::RangeInclusive;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{MonitorError, Result};

/// Accepted temperature range in degrees Celsius, bounds included
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -50.0..=100.0;

/// Accepted relative humidity range in percent, bounds included
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// Field of the subscription `data` object that carries the snapshot
pub const SENSOR_DATA_FIELD: &str = "sensorData";

/// A single measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environmental {
    #[serde(default)]
    pub temperature: Option<Reading>,
    #[serde(default)]
    pub humidity: Option<Reading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    #[serde(default)]
    pub air: Option<Reading>,
    #[serde(default)]
    pub co: Option<Reading>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sensors {
    #[serde(default)]
    pub environmental: Environmental,
    #[serde(default)]
    pub air_quality: AirQuality,
}

/// Connectivity report of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// The backend reports this as `"true"`/`"false"`; booleans are accepted too
    #[serde(default, deserialize_with = "bool_or_string")]
    pub online: bool,
    /// Signal strength in dBm
    #[serde(default)]
    pub rssi: i32,
    /// Seconds since the device booted
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub timestamp: String,
}

impl DeviceStatus {
    pub fn badge(&self) -> &'static str {
        if self.online {
            "Online"
        } else {
            "Offline"
        }
    }

    pub fn uptime_text(&self) -> String {
        format_uptime(self.uptime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub last_seen: String,
    #[serde(default)]
    pub sensors: Sensors,
    #[serde(default)]
    pub status: DeviceStatus,
}

/// One row of the per-device readings list
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub name: &'static str,
    pub value: f64,
    pub unit: String,
}

impl Device {
    pub fn temperature(&self) -> Option<&Reading> {
        self.sensors.environmental.temperature.as_ref()
    }

    pub fn humidity(&self) -> Option<&Reading> {
        self.sensors.environmental.humidity.as_ref()
    }

    /// Label shown for the device, the room when known
    pub fn label(&self) -> &str {
        if self.room.is_empty() {
            &self.device_id
        } else {
            &self.room
        }
    }

    /// Readings in display order; sensors the device did not report are skipped
    pub fn readings(&self) -> Vec<ReadingRow> {
        let sensors = &self.sensors;
        [
            ("Temperature", sensors.environmental.temperature.as_ref()),
            ("Humidity", sensors.environmental.humidity.as_ref()),
            ("Air Quality", sensors.air_quality.air.as_ref()),
            ("CO", sensors.air_quality.co.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, reading)| {
            reading.map(|r| ReadingRow {
                name,
                value: r.value,
                unit: r.unit.clone(),
            })
        })
        .collect()
    }

    fn validate(&self) -> Result<()> {
        let temperature = self.temperature().ok_or_else(|| {
            MonitorError::Validation(format!("device '{}' has no temperature", self.device_id))
        })?;
        let humidity = self.humidity().ok_or_else(|| {
            MonitorError::Validation(format!("device '{}' has no humidity", self.device_id))
        })?;

        if !TEMPERATURE_RANGE.contains(&temperature.value) {
            return Err(MonitorError::Validation(format!(
                "device '{}' temperature {} outside [{}, {}]",
                self.device_id,
                temperature.value,
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            )));
        }
        if !HUMIDITY_RANGE.contains(&humidity.value) {
            return Err(MonitorError::Validation(format!(
                "device '{}' humidity {} outside [{}, {}]",
                self.device_id,
                humidity.value,
                HUMIDITY_RANGE.start(),
                HUMIDITY_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// One push of sensor state across all devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl SensorSnapshot {
    /// Decode the `data` object of a subscription push
    pub fn from_push(data: &Value) -> Result<Self> {
        let payload = data.get(SENSOR_DATA_FIELD).ok_or_else(|| {
            MonitorError::Validation(format!("push has no '{}' field", SENSOR_DATA_FIELD))
        })?;
        SensorSnapshot::deserialize(payload)
            .map_err(|e| MonitorError::Validation(format!("undecodable snapshot: {}", e)))
    }

    /// Check every device; the first failing device is reported
    pub fn validate(&self) -> Result<()> {
        self.devices.iter().try_for_each(Device::validate)
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.device(device_id).is_some()
    }
}

/// Uptime as whole hours and minutes, e.g. `"1h 1m"` for 3661 seconds
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{}h {}m", hours, minutes)
}

fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Flag::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        Flag::Text(s) => Err(serde::de::Error::custom(format!(
            "expected \"true\" or \"false\", got \"{}\"",
            s
        ))),
    }
}
