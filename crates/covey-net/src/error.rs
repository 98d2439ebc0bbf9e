//! Error types for network operations.

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Socket-level failure: connect, read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote node did not reply within the request timeout.
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded the configured size cap.
    #[error("message too large: {len} bytes (max {max})")]
    MessageTooLarge {
        /// Length announced or produced.
        len: usize,
        /// The configured cap.
        max: usize,
    },
}
