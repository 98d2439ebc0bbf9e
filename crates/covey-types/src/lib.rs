//! Core data model shared by every Covey crate.
//!
//! Node identities, chunk records, the learner's aggregation table and the
//! node event type live here so the other crates can exchange them without
//! depending on each other.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------
// Identifiers
// -----------------------------------------------------------------------

/// Identity of a node in the cluster.
///
/// Ids are small dense integers derived from the configured address list:
/// the node listening on the lowest port gets id 0, the next one id 1, and
/// so on. Election precedence compares these ids directly, so the node on
/// the highest port outranks everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u16);

impl NodeId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for NodeId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash of a stored chunk (32-byte BLAKE3).
///
/// Computed once when a part is placed and again by each holder during a
/// retrieval check. Equal hashes mean the holder still has the exact bytes
/// the cluster recorded for that chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkHash([u8; 32]);

impl ChunkHash {
    /// Hash the given chunk bytes.
    pub fn from_data(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ChunkHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ChunkHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({self})")
    }
}

// -----------------------------------------------------------------------
// Roles and liveness
// -----------------------------------------------------------------------

/// Role a node currently plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Coordinates elections and publishes download descriptors.
    Leader,
    /// Aggregates chunk metadata and arbitrates retrieval checks.
    Learner,
    /// Stores chunks and answers retrieval checks.
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Learner => write!(f, "learner"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Liveness as reported over the wire.
///
/// An administratively downed node keeps answering pings but reports
/// [`NodeStatus::Down`], which excludes it from placement and makes the
/// liveness monitor escalate when it is the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ok,
    Down,
}

// -----------------------------------------------------------------------
// Chunk naming
// -----------------------------------------------------------------------

/// Wire and storage name of one part of a file: `"<file>.part-<index>"`.
pub fn chunk_name(file_name: &str, part_index: u32) -> String {
    format!("{file_name}.part-{part_index}")
}

/// Path a chunk lives at, relative to the holder's data directory.
pub fn chunk_storage_path(chunk_name: &str) -> String {
    format!("chunks/{chunk_name}")
}

// -----------------------------------------------------------------------
// Chunk records and the aggregation table
// -----------------------------------------------------------------------

/// One placed chunk as known to the cluster.
///
/// A record is produced twice with identical content: once on the node
/// that drove the placement (then shipped to the learner) and once on the
/// holder itself when the chunk lands in its store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Uploaded file this chunk belongs to.
    pub file_name: String,
    /// Name of this part, see [`chunk_name`].
    pub chunk_name: String,
    /// Zero-based index of the part within the file.
    pub part_index: u32,
    /// Path relative to the holder's data directory.
    pub storage_path: String,
    /// Hash of the chunk bytes at placement time.
    pub content_hash: ChunkHash,
    /// Set once a retrieval check confirmed the holder's bytes.
    pub valid: bool,
}

/// Which node holds which chunks, keyed by holder address.
///
/// The learner maintains the authoritative copy, merged from the tables
/// nodes send after a placement. Merging is append-only and never
/// deduplicates: shipping the same table twice records every row twice,
/// so senders must only ship rows the learner has not seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChunkTable {
    rows: BTreeMap<String, Vec<ChunkRecord>>,
}

impl NodeChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records under a holder's address.
    pub fn append(&mut self, holder: &str, records: Vec<ChunkRecord>) {
        if records.is_empty() {
            return;
        }
        self.rows.entry(holder.to_string()).or_default().extend(records);
    }

    /// Append every row of another table into this one.
    pub fn merge(&mut self, other: NodeChunkTable) {
        for (holder, records) in other.rows {
            self.rows.entry(holder).or_default().extend(records);
        }
    }

    /// All records stored under a holder's address.
    pub fn records_of(&self, holder: &str) -> &[ChunkRecord] {
        self.rows.get(holder).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Records a given holder claims for a given file.
    pub fn records_for_file(&self, holder: &str, file_name: &str) -> Vec<ChunkRecord> {
        self.records_of(holder)
            .iter()
            .filter(|record| record.file_name == file_name)
            .cloned()
            .collect()
    }

    /// Every file name mentioned by any record, sorted and deduplicated.
    pub fn file_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for records in self.rows.values() {
            for record in records {
                names.insert(record.file_name.as_str());
            }
        }
        names.into_iter().map(str::to_string).collect()
    }

    /// Holder addresses present in the table.
    pub fn holders(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ChunkRecord])> {
        self.rows.iter().map(|(holder, records)| (holder.as_str(), records.as_slice()))
    }

    /// Total number of records across all holders.
    pub fn record_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// -----------------------------------------------------------------------
// Retrieval results
// -----------------------------------------------------------------------

/// A chunk whose holder re-read and re-hashed it during a retrieval round,
/// with a hash matching the recorded one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedChunk {
    pub record: ChunkRecord,
    /// Address of the node that proved it still holds the bytes.
    pub holder: String,
}

impl ValidatedChunk {
    /// Public download pointer for this chunk. The content hash stays
    /// internal to the cluster.
    pub fn descriptor(&self) -> DownloadDescriptor {
        DownloadDescriptor {
            chunk_name: self.record.chunk_name.clone(),
            part_index: self.record.part_index,
            holder: self.holder.clone(),
            path: self.record.storage_path.clone(),
        }
    }
}

/// Where a client can fetch one verified part of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub chunk_name: String,
    pub part_index: u32,
    pub holder: String,
    pub path: String,
}

// -----------------------------------------------------------------------
// Node status and events
// -----------------------------------------------------------------------

/// Snapshot of a node's view of itself and the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub node_id: NodeId,
    pub role: Role,
    pub live: bool,
    pub leader: NodeId,
    pub learner: Option<NodeId>,
    pub epoch: u64,
    /// Files this node believes exist in the cluster.
    pub files: Vec<String>,
}

/// Events broadcast on a node's observer channel.
///
/// Role transitions, catalog updates after a placement and the download
/// descriptors produced by a settled retrieval round all surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Free-form progress line, mirrored to the log.
    Status(String),
    /// A leader announcement was accepted.
    LeaderChanged { leader: NodeId, epoch: u64 },
    /// A learner assignment was accepted, or the slot emptied.
    LearnerChanged { learner: Option<NodeId>, epoch: u64 },
    /// The known file catalog changed.
    CatalogUpdated { files: Vec<String> },
    /// A retrieval round settled and produced download pointers.
    ChunkLocations {
        file_name: String,
        descriptors: Vec<DownloadDescriptor>,
    },
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
