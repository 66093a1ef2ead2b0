//! # homewatch-app
//!
//! Application layer — the controller core and its **port definitions**.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement:
//!   - `BusClient` — publish and subscribe on the single bus connection
//!   - `MessageHandler` — receive every inbound bus message
//!   - `Registry` — topology, broker, base topic, and device status upserts
//!   - `StatusProvider` — read-only view for outer surfaces
//! - Partition units across controllers (`routing`) and keep the pool
//!   (`pool`) and routing table (`snapshot`) consistent under concurrency
//! - Run the per-controller rule engine (`controller`) and the
//!   rebalancer/dispatcher that owns the bus subscription (`rebalancer`)
//! - Provide **in-process infrastructure** that doesn't need IO: the
//!   periodic task runner and an in-process bus
//!
//! ## Dependency rule
//! Depends on `homewatch-domain` only (plus `tokio` and `tokio-util` for
//! synchronisation, timers, and cancellation). Never imports adapter crates.

pub mod controller;
pub mod in_process_bus;
pub mod periodic;
pub mod pool;
pub mod ports;
pub mod rebalancer;
pub mod routing;
pub mod snapshot;
