//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the controller core and the outside
//! world. They are defined here (in `app`) so that both the core and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod bus;
pub mod registry;
pub mod status;

pub use bus::{BusClient, MessageHandler};
pub use registry::Registry;
pub use status::{ControllerStatus, StatusProvider, SystemStatus};
