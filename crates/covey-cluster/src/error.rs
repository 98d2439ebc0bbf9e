//! Error types for the cluster crate.

/// Errors produced by cluster layout derivation.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The configured cluster has no nodes.
    #[error("cluster address list is empty")]
    EmptyCluster,

    /// An address without a parseable `host:port` form.
    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),

    /// Ports must be dense above the lowest configured port.
    #[error("port of {addr:?} does not fit the dense range starting at {base}")]
    SparsePorts {
        /// The offending address.
        addr: String,
        /// The lowest configured port.
        base: u16,
    },

    /// Two addresses mapped to the same node id.
    #[error("{first:?} and {second:?} share a port")]
    DuplicatePort {
        /// The address seen first.
        first: String,
        /// The clashing address.
        second: String,
    },
}
