//! Typed identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const CONTROLLER_PREFIX: &str = "controller_";

/// Identifier of a controller in the pool.
///
/// Controllers are numbered from zero in creation order and rendered as
/// `controller_<index>` on the wire and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(usize);

impl ControllerId {
    /// Identifier of the controller at `index` in the pool.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position of this controller in the pool.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CONTROLLER_PREFIX}{}", self.0)
    }
}

/// Error returned when parsing a [`ControllerId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid controller id `{0}`")]
pub struct ParseControllerIdError(String);

impl FromStr for ControllerId {
    type Err = ParseControllerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(CONTROLLER_PREFIX)
            .and_then(|index| index.parse().ok())
            .map(Self)
            .ok_or_else(|| ParseControllerIdError(s.to_string()))
    }
}

impl Serialize for ControllerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ControllerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
