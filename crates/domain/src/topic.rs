//! Topic grammar.
//!
//! - sensors: `<base>/sensors/<houseID>/<floorID>/<unitID>/<sensorType>`
//! - commands: `<base>/commands/<houseID>/<floorID>/<unitID>/<deviceName>`
//!
//! The base topic is a single segment.

use crate::error::TopicError;
use crate::unit::UnitKey;

/// Subtree holding sensor readings.
pub const SENSORS: &str = "sensors";
/// Subtree holding actuator commands.
pub const COMMANDS: &str = "commands";

/// Segments needed to locate a unit (`base/sensors/h/f/u`).
const UNIT_SEGMENTS: usize = 5;
/// Segments of a complete sensor topic.
const SENSOR_SEGMENTS: usize = 6;

/// A parsed sensor topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTopic<'a> {
    pub base: &'a str,
    pub unit: UnitKey,
    pub sensor_type: &'a str,
}

impl<'a> SensorTopic<'a> {
    /// Parse a complete sensor topic.
    ///
    /// # Errors
    ///
    /// Returns a [`TopicError`] if the topic has fewer than six segments, is
    /// not under `sensors`, or carries non-integer ids.
    pub fn parse(topic: &'a str) -> Result<Self, TopicError> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() < SENSOR_SEGMENTS {
            return Err(TopicError::TooShort {
                expected: SENSOR_SEGMENTS,
                actual: segments.len(),
            });
        }
        Ok(Self {
            base: segments[0],
            unit: unit_from_segments(&segments)?,
            sensor_type: segments[5],
        })
    }
}

/// Extract the unit a sensor topic belongs to.
///
/// Only the first five segments are inspected; this is what the dispatcher
/// needs to pick a controller.
///
/// # Errors
///
/// Returns a [`TopicError`] if the topic has fewer than five segments, is not
/// under `sensors`, or carries non-integer ids.
pub fn unit_key(topic: &str) -> Result<UnitKey, TopicError> {
    let segments: Vec<&str> = topic.splitn(UNIT_SEGMENTS + 1, '/').collect();
    if segments.len() < UNIT_SEGMENTS {
        return Err(TopicError::TooShort {
            expected: UNIT_SEGMENTS,
            actual: segments.len(),
        });
    }
    unit_from_segments(&segments)
}

fn unit_from_segments(segments: &[&str]) -> Result<UnitKey, TopicError> {
    if segments[1] != SENSORS {
        return Err(TopicError::WrongSubtree {
            expected: SENSORS,
            actual: segments[1].to_string(),
        });
    }
    let id = |field: &'static str, value: &str| {
        value.parse::<u32>().map_err(|_| TopicError::InvalidId {
            field,
            value: value.to_string(),
        })
    };
    Ok(UnitKey::new(
        id("house", segments[2])?,
        id("floor", segments[3])?,
        id("unit", segments[4])?,
    ))
}

/// Topic a command for `device_name` in `unit` is published on.
#[must_use]
pub fn command_topic(base: &str, unit: UnitKey, device_name: &str) -> String {
    format!(
        "{base}/{COMMANDS}/{}/{}/{}/{device_name}",
        unit.house_id, unit.floor_id, unit.unit_id
    )
}

/// `true` if `base` is usable as a base topic: one non-empty level with no
/// wildcard characters. Other bases make every sensor topic unparseable.
#[must_use]
pub fn is_single_level(base: &str) -> bool {
    !base.is_empty() && !base.contains(['/', '+', '#'])
}

/// Wildcard filter covering every sensor topic under `base`.
#[must_use]
pub fn sensors_filter(base: &str) -> String {
    format!("{base}/{SENSORS}/#")
}

/// MQTT filter matching: `+` matches one level, a trailing `#` matches the
/// remaining levels (including none).
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
