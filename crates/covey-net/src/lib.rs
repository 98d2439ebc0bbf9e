//! Network protocol on framed TCP.
//!
//! This crate implements Covey's network layer:
//!
//! - [`Message`] — the wire protocol (postcard-serialized).
//! - [`TcpTransport`] — connect-per-request client side.
//! - [`serve`] — listener loop feeding inbound frames to a [`MessageHandler`].
//!
//! Every RPC in the cluster is a single request/reply exchange, so the
//! whole layer reduces to "send one frame, read one frame back".

mod error;
mod message;
mod tcp;

pub use error::NetError;
pub use message::Message;
pub use tcp::{TcpTransport, read_frame, serve, write_frame};

/// Largest frame a node will encode or accept.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Trait abstracting the request/reply exchange used by the engine.
///
/// This allows substituting an in-process mesh transport in tests
/// (avoiding the need for real sockets).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to the node at `addr` and wait for its reply.
    async fn request(&self, addr: &str, msg: Message) -> Result<Message, NetError>;
}

/// Server-side dispatch: turns one inbound message into its reply.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: Message) -> Message;
}
