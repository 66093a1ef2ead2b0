//! # homewatch-domain
//!
//! Pure domain model for the homewatch controller core.
//!
//! ## Responsibilities
//! - Foundational types: identifiers, error conventions, timestamps
//! - Define **units** (the smallest monitored space, keyed by house/floor/unit)
//! - Define the **topology snapshot** fetched from the device registry
//! - Define the **SenML envelope** carried on the bus and the topic grammar
//!   (`<base>/sensors/...`, `<base>/commands/...`)
//! - Define the **lighting rules** evaluated by controllers
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod broker;
pub mod message;
pub mod rules;
pub mod topic;
pub mod topology;
pub mod unit;
