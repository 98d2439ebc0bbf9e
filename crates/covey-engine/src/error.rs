//! Error types for the engine.

/// Errors that can occur while operating a node.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to access the chunk store.
    #[error("store error: {0}")]
    Store(#[from] covey_store::StoreError),

    /// Failed to access the metadata doc-store.
    #[error("meta error: {0}")]
    Meta(#[from] covey_meta::MetaError),

    /// Network transport error.
    #[error("network error: {0}")]
    Net(#[from] covey_net::NetError),
}
