//! Error types for chunk storage operations.

/// Errors that can occur during chunk storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A chunk name that cannot be used as a file name.
    #[error("invalid chunk name: {0:?}")]
    InvalidName(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
