//! Node orchestrator tying all Covey components together.
//!
//! The [`Node`] owns the chunk store, the doc-store, the cluster view and
//! the election coordinator, and serves the whole node-to-node and
//! operator RPC surface: liveness and election traffic, chunk placement,
//! learner-side metadata aggregation and retrieval checks.

pub mod error;
pub mod node;
pub mod pending;

mod aggregator;
mod placement;
mod validator;

pub use error::EngineError;
pub use node::{Node, NodeConfig};
pub use pending::{RecordOutcome, RetrievalRounds};

#[cfg(test)]
mod tests;
