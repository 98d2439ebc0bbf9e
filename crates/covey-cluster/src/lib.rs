//! Roles, elections and liveness for a statically configured cluster.
//!
//! This crate provides:
//!
//! - [`ClusterView`] — shared role state (leader, learner, liveness) with
//!   an event broadcast channel.
//! - [`Coordinator`] — bully-style election rounds and learner selection.
//! - [`monitor`] — periodic leader liveness probing with escalation.
//! - [`layout`] — node id derivation from the configured address list.

mod election;
mod error;
pub mod layout;
pub mod monitor;
mod state;


pub use election::{Coordinator, ElectionConfig};
pub use error::ClusterError;
pub use monitor::MonitorHandle;
pub use state::ClusterView;
