//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`HomeWatchError`] at port boundaries.

use crate::unit::UnitKey;

/// Boxed source error carried by IO-backed variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Port-boundary error for the homewatch core.
#[derive(Debug, thiserror::Error)]
pub enum HomeWatchError {
    /// The device registry could not be reached or answered with garbage.
    #[error("registry unavailable")]
    RegistryUnavailable(#[source] BoxError),

    /// The initial bus connection could not be established.
    #[error("failed to connect to the message bus")]
    BusConnect(#[source] BoxError),

    /// A publish or subscribe on an established bus connection failed.
    #[error("message bus error")]
    Bus(#[source] BoxError),

    /// A bus topic did not follow the expected grammar.
    #[error("malformed topic")]
    MalformedTopic(#[from] TopicError),

    /// A bus payload could not be decoded.
    #[error("malformed payload")]
    MalformedPayload(#[from] PayloadError),

    /// No controller is assigned to the unit yet.
    #[error("no controller assigned for unit {0}")]
    RoutingMiss(UnitKey),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

/// Reasons a topic string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Not enough `/`-separated segments.
    #[error("expected at least {expected} segments, got {actual}")]
    TooShort {
        /// Minimum number of segments required.
        expected: usize,
        /// Number of segments found.
        actual: usize,
    },

    /// The subtree segment is not the one expected (e.g. `sensors`).
    #[error("expected `{expected}` subtree, got `{actual}`")]
    WrongSubtree {
        /// Expected subtree name.
        expected: &'static str,
        /// Subtree found in the topic.
        actual: String,
    },

    /// A house/floor/unit segment is not an integer.
    #[error("invalid {field} id `{value}`")]
    InvalidId {
        /// Which id failed (`house`, `floor`, `unit`).
        field: &'static str,
        /// The offending segment.
        value: String,
    },
}

/// Reasons a bus payload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The payload is not a valid SenML envelope.
    #[error("invalid SenML envelope")]
    Json(#[from] serde_json::Error),

    /// The envelope carries no records.
    #[error("envelope has no records")]
    Empty,

    /// The record value does not fit the sensor type.
    #[error("unexpected value {value} for {sensor}")]
    InvalidValue {
        /// Sensor type name.
        sensor: &'static str,
        /// Raw value as received.
        value: serde_json::Value,
    },

    /// The sensor type is not one controllers react to.
    #[error("unsupported sensor type `{0}`")]
    UnsupportedSensor(String),
}
