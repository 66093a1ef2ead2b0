//! Registry port — the external device catalog.

use std::future::Future;

use homewatch_domain::broker::BrokerAddress;
use homewatch_domain::error::HomeWatchError;
use homewatch_domain::topology::{DeviceRecord, Topology};

/// Source of truth for topology and device status.
///
/// Implementations must bound every call with a timeout and report failures
/// as [`HomeWatchError::RegistryUnavailable`].
pub trait Registry {
    /// `GET /houses` — the full houses → floors → units tree.
    fn fetch_topology(&self) -> impl Future<Output = Result<Topology, HomeWatchError>> + Send;

    /// `GET /broker` — where the bus lives.
    fn fetch_broker(&self) -> impl Future<Output = Result<BrokerAddress, HomeWatchError>> + Send;

    /// `GET /topic` — the project-wide base topic.
    fn fetch_base_topic(&self) -> impl Future<Output = Result<String, HomeWatchError>> + Send;

    /// `PUT /devices` — upsert one device record.
    fn put_device(
        &self,
        device: &DeviceRecord,
    ) -> impl Future<Output = Result<(), HomeWatchError>> + Send;
}
