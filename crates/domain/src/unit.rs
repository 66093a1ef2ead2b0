//! Unit — the smallest monitored space, keyed by house, floor, and unit id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identity of a monitored unit.
///
/// Ordering is numeric on `(house, floor, unit)`; this is the order used to
/// partition units across controllers. The string form `h-f-u` is the key
/// used in the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    pub house_id: u32,
    pub floor_id: u32,
    pub unit_id: u32,
}

impl UnitKey {
    #[must_use]
    pub const fn new(house_id: u32, floor_id: u32, unit_id: u32) -> Self {
        Self {
            house_id,
            floor_id,
            unit_id,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.house_id, self.floor_id, self.unit_id)
    }
}

/// Error returned when parsing a [`UnitKey`] from its `h-f-u` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid unit key `{0}`, expected `house-floor-unit`")]
pub struct ParseUnitKeyError(String);

impl FromStr for UnitKey {
    type Err = ParseUnitKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseUnitKeyError(s.to_string());
        let mut parts = s.split('-');
        let mut next = || -> Result<u32, ParseUnitKeyError> {
            parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)
        };
        let key = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(key)
    }
}

impl Serialize for UnitKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
