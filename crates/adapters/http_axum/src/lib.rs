//! # homewatch-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a small **read-only JSON API** over the controller core:
//!   - `GET /health` — liveness
//!   - `GET /api/status` — base topic, partition size, and per-controller
//!     assignments
//!   - `GET /api/routing` — the routing table currently in effect
//! - Map the [`StatusProvider`](homewatch_app::ports::StatusProvider) port
//!   into HTTP responses (driving adapter)
//!
//! ## Dependency rule
//! Depends on `homewatch-app` (for the status port) and `homewatch-domain`.
//! Never leaks axum types into the core.

pub mod api;
pub mod router;
pub mod state;
