//! Topology snapshot — the houses → floors → units → devices tree served by
//! the device registry.
//!
//! The snapshot is read-only input. Field names follow the registry's JSON
//! (`houseID`, `devicesList`, …). Unknown device fields are preserved so a
//! status write-back does not drop data the registry owns.
//!
//! The registry stores device entries as submitted, so every device field is
//! optional and a field of the wrong shape reads as absent. Only the
//! house/floor/unit ids are required.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::unit::UnitKey;

/// Full topology as returned by `GET /houses`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    pub houses: Vec<House>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct House {
    #[serde(rename = "houseID", deserialize_with = "int_or_string")]
    pub house_id: u32,
    #[serde(default)]
    pub floors: Vec<Floor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    #[serde(rename = "floorID", deserialize_with = "int_or_string")]
    pub floor_id: u32,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(rename = "unitID", deserialize_with = "int_or_string")]
    pub unit_id: u32,
    #[serde(rename = "devicesList", default)]
    pub devices_list: Vec<DeviceRecord>,
}

/// Registry device identifier.
///
/// The registry matches devices on upsert by comparing `deviceID` values as
/// JSON, so the original representation (number or string) is kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Location of a device inside the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLocation {
    #[serde(rename = "houseID", deserialize_with = "int_or_string")]
    pub house_id: u32,
    #[serde(rename = "floorID", deserialize_with = "int_or_string")]
    pub floor_id: u32,
    #[serde(rename = "unitID", deserialize_with = "int_or_string")]
    pub unit_id: u32,
}

impl From<UnitKey> for DeviceLocation {
    fn from(key: UnitKey) -> Self {
        Self {
            house_id: key.house_id,
            floor_id: key.floor_id,
            unit_id: key.unit_id,
        }
    }
}

/// One device entry of a unit's `devicesList`.
///
/// This is also the body of `PUT /devices`. A record without a usable
/// `deviceID` still counts towards its unit but is never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(
        rename = "deviceID",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_id: Option<DeviceId>,
    #[serde(
        rename = "deviceName",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_name: Option<String>,
    #[serde(
        rename = "deviceLocation",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_location: Option<DeviceLocation>,
    #[serde(
        rename = "deviceStatus",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_status: Option<String>,
    #[serde(
        rename = "lastUpdate",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_update: Option<String>,
    #[serde(
        rename = "lastCommandReason",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_command_reason: Option<String>,
    /// Fields the registry stores that this core does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Topology {
    /// Keys of every unit carrying at least one device, in partition order.
    #[must_use]
    pub fn unit_keys(&self) -> BTreeSet<UnitKey> {
        self.units()
            .filter(|(_, unit)| !unit.devices_list.is_empty())
            .map(|(key, _)| key)
            .collect()
    }

    /// Find a device by name inside a unit.
    #[must_use]
    pub fn device(&self, key: UnitKey, device_name: &str) -> Option<&DeviceRecord> {
        self.units()
            .find(|(k, _)| *k == key)
            .and_then(|(_, unit)| {
                unit.devices_list
                    .iter()
                    .find(|d| d.device_name.as_deref() == Some(device_name))
            })
    }

    /// Iterate all units with their keys.
    pub fn units(&self) -> impl Iterator<Item = (UnitKey, &Unit)> {
        self.houses.iter().flat_map(|house| {
            house.floors.iter().flat_map(move |floor| {
                floor.units.iter().map(move |unit| {
                    (
                        UnitKey::new(house.house_id, floor.floor_id, unit.unit_id),
                        unit,
                    )
                })
            })
        })
    }
}

/// Read an optional field; a value of the wrong shape (or `null`) is `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Accept integer ids encoded either as JSON numbers or numeric strings.
fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
