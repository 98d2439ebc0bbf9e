//! Doc-store persistence layer wrapping Fjall.
//!
//! [`DocStore`] persists chunk tables as docs keyed by a role-derived
//! name: the learner writes its aggregated table under `learner-doc`,
//! every other node writes its own holdings under `node-<id>-doc`. A node
//! reloads its doc on start (and on gaining the learner role), so
//! recorded placements survive restarts.

mod error;
mod store;

pub use error::MetaError;
pub use store::{DocStore, doc_name};
