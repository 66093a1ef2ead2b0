//! MQTT adapter error types.

use homewatch_domain::error::HomeWatchError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The broker could not be reached or dropped the connection.
    #[error("MQTT connection error")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker answered CONNACK with a failure code.
    #[error("MQTT broker refused the connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    /// No CONNACK arrived in time.
    #[error("no CONNACK from {broker} within {timeout_secs}s")]
    ConnectTimeout { broker: String, timeout_secs: u64 },

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// A publish or subscribe did not complete in time.
    #[error("MQTT request on {topic} timed out")]
    RequestTimeout { topic: String },

    /// Failed to encode an outgoing payload.
    #[error("failed to encode MQTT payload")]
    Payload(#[source] homewatch_domain::error::PayloadError),
}

impl MqttError {
    /// Convert into a [`HomeWatchError`] for propagation across port
    /// boundaries. Failures while establishing the connection become
    /// [`HomeWatchError::BusConnect`].
    pub fn into_domain(self) -> HomeWatchError {
        match self {
            Self::Payload(err) => HomeWatchError::MalformedPayload(err),
            err @ (Self::Connection(_) | Self::Refused(_) | Self::ConnectTimeout { .. }) => {
                HomeWatchError::BusConnect(Box::new(err))
            }
            other => HomeWatchError::Bus(Box::new(other)),
        }
    }
}

impl From<MqttError> for HomeWatchError {
    fn from(err: MqttError) -> Self {
        err.into_domain()
    }
}
