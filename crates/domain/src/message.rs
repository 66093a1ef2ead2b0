//! SenML-style envelope carried on the bus, plus the typed readings and
//! commands extracted from it.
//!
//! ```json
//! {"bn": "<topic>", "e": [{"n": "<name>", "u": "<unit>", "t": "<unix-ts>", "v": <value>}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::time::{self, Timestamp};

/// Motion value meaning "motion detected".
pub const MOTION_DETECTED: &str = "Detected";
/// Motion value meaning "no motion".
pub const NO_MOTION: &str = "No Motion";

/// A bus message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenMlMessage {
    /// Base name; the topic the message was published on.
    pub bn: String,
    /// Records; readers only look at the first one.
    pub e: Vec<SenMlRecord>,
}

/// One measurement or command record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenMlRecord {
    pub n: String,
    pub u: String,
    /// Unix timestamp in seconds, as a string.
    pub t: String,
    pub v: serde_json::Value,
}

impl SenMlMessage {
    /// Decode an envelope from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] for invalid JSON or a missing field.
    pub fn from_slice(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Json`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The value of the first record.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Empty`] when there are no records.
    pub fn first_value(&self) -> Result<&serde_json::Value, PayloadError> {
        self.e.first().map(|r| &r.v).ok_or(PayloadError::Empty)
    }

    /// Build a command envelope for `topic`.
    #[must_use]
    pub fn command(topic: &str, command: Command, at: Timestamp) -> Self {
        Self {
            bn: topic.to_string(),
            e: vec![SenMlRecord {
                n: "actuator".to_string(),
                u: "command".to_string(),
                t: time::unix_seconds(at),
                v: serde_json::Value::String(command.to_string()),
            }],
        }
    }
}

/// Switch command sent to an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    On,
    Off,
}

impl Command {
    /// Wire form, also used as the device status in the registry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor types controllers react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Light,
    Motion,
}

impl SensorKind {
    /// Topic segment naming this sensor type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light_sensor",
            Self::Motion => "motion_sensor",
        }
    }

    /// Map a topic segment to a sensor type.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::UnsupportedSensor`] for any other segment.
    pub fn from_segment(segment: &str) -> Result<Self, PayloadError> {
        match segment {
            "light_sensor" => Ok(Self::Light),
            "motion_sensor" => Ok(Self::Motion),
            other => Err(PayloadError::UnsupportedSensor(other.to_string())),
        }
    }
}

/// A decoded sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Light level in lux.
    Light(f64),
    /// Motion sensor state; `true` when motion was detected.
    Motion(bool),
}

impl Reading {
    /// Decode the first record of `message` according to `kind`.
    ///
    /// Light values may arrive as JSON numbers or numeric strings.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Empty`] for an envelope without records and
    /// [`PayloadError::InvalidValue`] when the value does not fit the sensor.
    pub fn decode(kind: SensorKind, message: &SenMlMessage) -> Result<Self, PayloadError> {
        let value = message.first_value()?;
        let invalid = || PayloadError::InvalidValue {
            sensor: kind.as_str(),
            value: value.clone(),
        };
        match kind {
            SensorKind::Light => {
                let lux = match value {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                lux.filter(|v: &f64| v.is_finite())
                    .map(Self::Light)
                    .ok_or_else(invalid)
            }
            SensorKind::Motion => match value.as_str() {
                Some(MOTION_DETECTED) => Ok(Self::Motion(true)),
                Some(NO_MOTION) => Ok(Self::Motion(false)),
                _ => Err(invalid()),
            },
        }
    }
}
