//! Chunk storage trait and backend implementations.
//!
//! This crate defines the [`ChunkStore`] trait for persisting file chunks
//! under their wire names, along with two concrete backends:
//!
//! - [`MemoryStore`] — in-memory storage backed by a `RwLock<HashMap>`.
//! - [`FileStore`] — plain files under the node's data directory, written
//!   atomically.

mod error;
mod file_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use traits::ChunkStore;
