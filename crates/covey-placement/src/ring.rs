//! Ring replication layout for file parts.
//!
//! Active workers are arranged in a ring ordered by node id. With `k`
//! parts, the worker at ring position `i` stores its own part `i` plus its
//! predecessor's part `(i - 1) mod k`, so every part ends up on exactly
//! two neighbouring workers. Clusters with one or two active workers
//! degrade to a single part stored once.

use tracing::debug;

/// Parts one worker stores after a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartAssignment {
    /// Ring position of the worker (index into the active worker list,
    /// ordered by node id).
    pub position: usize,
    /// Part indices this worker stores, own part first.
    pub parts: Vec<usize>,
}

/// Number of parts a file is split into for `active_workers`.
///
/// Above two workers every worker gets its own part (plus a neighbour's
/// copy); at one or two workers the file stays whole and is stored once.
pub fn part_count(active_workers: usize) -> usize {
    if active_workers > 2 { active_workers } else { 1 }
}

/// Compute the ring layout for `active_workers` active workers.
///
/// Returns one assignment per ring position that stores anything. With
/// `k = part_count(active_workers)` parts, position `i` is assigned parts
/// `i` and `(i + k - 1) % k`; equivalently, part `p` is held by positions
/// `p` and `(p + 1) % k`. With a single part there is a single holder at
/// position 0.
pub fn plan(active_workers: usize) -> Vec<PartAssignment> {
    if active_workers == 0 {
        return Vec::new();
    }

    let k = part_count(active_workers);
    if k == 1 {
        debug!(active_workers, "single-part layout");
        return vec![PartAssignment {
            position: 0,
            parts: vec![0],
        }];
    }

    (0..k)
        .map(|i| PartAssignment {
            position: i,
            parts: vec![i, (i + k - 1) % k],
        })
        .collect()
}

/// Ring positions that hold a given part under a `k`-part layout.
pub fn holders_of(part: usize, k: usize) -> Vec<usize> {
    if k <= 1 {
        return vec![0];
    }
    vec![part, (part + 1) % k]
}
