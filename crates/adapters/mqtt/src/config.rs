//! MQTT bus configuration.

use std::time::Duration;

use serde::Deserialize;

use homewatch_domain::broker::BrokerAddress;

/// Port used when a broker host override is given without a port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Configuration for the MQTT bus connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host. When set, the registry's `/broker` answer is ignored.
    pub broker_host: Option<String>,
    /// Broker port for the host override.
    pub broker_port: Option<u16>,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Upper bound on a single publish or subscribe, in seconds.
    pub request_timeout_secs: u64,
    /// How long to wait for the broker's CONNACK at startup, in seconds.
    pub connect_timeout_secs: u64,
    /// Capacity of the client's outbound request queue.
    pub channel_capacity: usize,
    /// Base topic used when the registry cannot provide one.
    pub fallback_base_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: None,
            broker_port: None,
            client_id: "homewatch-rebalancer".to_string(),
            keep_alive_secs: 30,
            request_timeout_secs: 5,
            connect_timeout_secs: 10,
            channel_capacity: 64,
            fallback_base_topic: "ThiefDetector".to_string(),
        }
    }
}

impl MqttConfig {
    /// Broker address from the override, if one is configured.
    #[must_use]
    pub fn broker_override(&self) -> Option<BrokerAddress> {
        self.broker_host.as_ref().map(|host| BrokerAddress {
            host: host.clone(),
            port: self.broker_port.unwrap_or(DEFAULT_BROKER_PORT),
        })
    }

    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
