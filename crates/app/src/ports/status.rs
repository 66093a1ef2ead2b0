//! Status port — read-only view of the controller core for outer surfaces.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use homewatch_domain::id::ControllerId;
use homewatch_domain::unit::UnitKey;

use crate::routing::RoutingTable;

/// Something that can describe the running controller core.
pub trait StatusProvider: Send + Sync + 'static {
    /// Summary of the pool and its controllers.
    fn status(&self) -> impl Future<Output = SystemStatus> + Send;

    /// The routing table currently in effect.
    fn routing(&self) -> Arc<RoutingTable>;
}

/// Summary of the controller pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub base_topic: String,
    pub partition_size: usize,
    /// Units in the current routing table.
    pub units: usize,
    pub controllers: Vec<ControllerStatus>,
}

/// What one controller owns and tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub id: ControllerId,
    /// Units currently routed to this controller.
    pub assigned_units: Vec<UnitKey>,
    /// Assigned units this controller holds state for.
    pub tracked_units: usize,
}
