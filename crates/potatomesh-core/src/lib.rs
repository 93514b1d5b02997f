//! Reconciliation engine for PotatoMesh node state.
//!
//! Independent read-only feeds (nodes, telemetry, positions, neighbors,
//! traces, messages) each report partial facts about the same devices. This
//! crate folds them into one [`NodeAggregate`] per device.

pub mod alias;
pub mod builder;
pub mod coerce;
pub mod config;
pub mod error;
pub mod identity;
pub mod merge;
pub mod naming;
pub mod node;
pub mod records;
pub mod snapshot;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use identity::*;
pub use node::*;
pub use records::*;
pub use snapshot::*;
