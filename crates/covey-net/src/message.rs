//! Protocol messages for the Covey network layer.
//!
//! All messages are serialized with postcard and exchanged as single
//! request/reply frames over TCP.

use serde::{Deserialize, Serialize};

use covey_types::{ChunkRecord, NodeChunkTable, NodeId, NodeStatus, StatusReport, ValidatedChunk};

/// Protocol messages exchanged between Covey nodes.
///
/// Each message is sent as a length-prefixed postcard-encoded payload.
/// Every request variant has a well-known reply; [`Message::Ack`] and
/// [`Message::Refused`] close the exchanges that carry no data back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Liveness check.
    Ping {
        /// Id of the probing node.
        node_id: NodeId,
    },

    /// Response to a [`Message::Ping`].
    ///
    /// An administratively downed node still replies, but with
    /// [`NodeStatus::Down`].
    PingReply {
        status: NodeStatus,
    },

    /// Ask a node whether it is (or will act as) the learner.
    ///
    /// Sent by a fresh leader scanning for a learner after winning an
    /// election.
    LearnerProbe {
        /// Id of the probing node.
        node_id: NodeId,
    },

    /// Response to a [`Message::LearnerProbe`].
    LearnerProbeReply {
        status: NodeStatus,
        /// Whether the responder already considers itself the learner.
        is_learner: bool,
        /// The responder's current file catalog.
        files: Vec<String>,
    },

    /// Ask a node whether it is currently coordinating an election.
    CoordinatorQuery {
        node_id: NodeId,
    },

    /// Response to a [`Message::CoordinatorQuery`].
    CoordinatorReply {
        coordinating: bool,
    },

    /// Election challenge from a lower-id node.
    Election {
        /// Id of the challenger.
        node_id: NodeId,
    },

    /// Response to a [`Message::Election`].
    ///
    /// `accept` means the responder outranks the challenger and takes
    /// over; the challenger then stands down for this round.
    ElectionReply {
        accept: bool,
    },

    /// Instruct the accepting node to start its own election round.
    ///
    /// Sent by a challenger to the first higher node that accepted its
    /// challenge.
    BecomeCoordinator {
        /// Id of the instructing node.
        node_id: NodeId,
    },

    /// Announce an election winner.
    ///
    /// Stamped with the winner's epoch; receivers apply the highest
    /// epoch they have seen and ignore stale announcements.
    NewLeader {
        leader: NodeId,
        epoch: u64,
    },

    /// Announce a learner assignment, stamped like [`Message::NewLeader`].
    NewLearner {
        learner: NodeId,
        epoch: u64,
    },

    /// Store one part of a file on the receiving node.
    ChunkPush {
        file_name: String,
        chunk_name: String,
        part_index: u32,
        data: Vec<u8>,
    },

    /// Ship placement records to the learner for aggregation.
    ChunkMetadata {
        /// Id of the node that drove the placement.
        node_id: NodeId,
        /// Rows to append into the learner's table.
        table: NodeChunkTable,
    },

    /// Response to a [`Message::ChunkMetadata`]: the learner's file
    /// catalog after the merge.
    ChunkMetadataReply {
        files: Vec<String>,
    },

    /// Ask a node to re-check its chunks of a file and report to the
    /// learner. Broadcast to every peer when a retrieval starts.
    ChunkRequest {
        /// Id of the node driving the retrieval.
        node_id: NodeId,
        file_name: String,
    },

    /// A holder's freshly re-hashed chunks of one file, sent to the
    /// learner for cross-checking.
    ChunkValidate {
        /// Id of the reporting holder.
        node_id: NodeId,
        file_name: String,
        chunks: Vec<ChunkRecord>,
    },

    /// The learner's settled list of verified chunks for one file,
    /// posted to the current leader.
    ChunkList {
        file_name: String,
        chunks: Vec<ValidatedChunk>,
    },

    /// Store a whole file in the cluster (client-facing).
    Upload {
        file_name: String,
        data: Vec<u8>,
    },

    /// Start a retrieval round for a file (client-facing).
    Retrieve {
        file_name: String,
    },

    /// Administratively mark the receiving node down or up.
    SetLive {
        up: bool,
    },

    /// Ask a node for its view of itself and the cluster.
    StatusQuery,

    /// Response to a [`Message::StatusQuery`].
    StatusReply {
        report: StatusReport,
    },

    /// Generic success reply for exchanges that carry no data back.
    Ack,

    /// Generic rejection reply, e.g. an upload sent to the learner or
    /// learner-only traffic sent to a worker.
    Refused {
        reason: String,
    },
}
