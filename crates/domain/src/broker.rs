//! Broker address as served by the registry's `GET /broker`.

use serde::{Deserialize, Deserializer, Serialize};

/// Where the message bus lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAddress {
    #[serde(rename = "IP")]
    pub host: String,
    #[serde(deserialize_with = "port_from_int_or_string")]
    pub port: u16,
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn port_from_int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u16),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(port) => Ok(port),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
