//! Ring-replicated placement of file parts.
//!
//! This crate decides how an uploaded file is cut into parts and which
//! active workers store which part. Placement depends only on the number
//! of active workers at upload time; nothing is rebalanced afterwards.

mod ring;
mod split;

pub use ring::{PartAssignment, holders_of, part_count, plan};
pub use split::split_into;
