//! Cluster role view: who leads, who learns, who is alive.
//!
//! [`ClusterView`] is the shared, read-mostly structure every other
//! component consults for the current leader, learner and liveness flag.
//! Observable changes fan out on a broadcast channel that the engine and
//! observers subscribe to.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

use covey_types::{NodeEvent, NodeId, Role};

/// Role and liveness state guarded by a single lock.
#[derive(Debug, Clone)]
struct ViewInner {
    leader: NodeId,
    learner: Option<NodeId>,
    epoch: u64,
    live: bool,
}

/// Shared view of cluster roles.
///
/// Membership is static: the peer list is fixed at start time and only
/// the roles painted onto it change. Role announcements carry the
/// winner's epoch; the view applies an announcement only when its epoch
/// is at least the one already applied, so stale broadcasts lose to
/// later rounds regardless of arrival order.
pub struct ClusterView {
    self_id: NodeId,
    self_addr: String,
    /// Peer addresses keyed by node id. Excludes this node.
    peers: BTreeMap<NodeId, String>,
    inner: RwLock<ViewInner>,
    /// Broadcast channel for role and progress events.
    event_tx: broadcast::Sender<NodeEvent>,
}

impl ClusterView {
    /// Create the view for one node.
    ///
    /// Seeds the initial roles the way every node does on boot: the
    /// highest id in the cluster starts as leader, the lowest as
    /// learner. A single-node cluster gets no learner.
    pub fn new(self_id: NodeId, self_addr: String, peers: BTreeMap<NodeId, String>) -> Arc<Self> {
        let all = || peers.keys().copied().chain([self_id]);
        let highest = all().max().unwrap_or(self_id);
        let lowest = all().min().unwrap_or(self_id);
        let learner = (lowest != highest).then_some(lowest);

        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            self_id,
            self_addr,
            peers,
            inner: RwLock::new(ViewInner {
                leader: highest,
                learner,
                epoch: 0,
                live: true,
            }),
            event_tx,
        })
    }

    /// Subscribe to role and progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event to subscribers. Dropped when nobody listens.
    pub fn notify(&self, event: NodeEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Peer addresses, excluding this node.
    pub fn peers(&self) -> &BTreeMap<NodeId, String> {
        &self.peers
    }

    /// Address of a peer by id. This node's own id resolves to `None`.
    pub fn addr_of(&self, id: NodeId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    /// Every id in the cluster including this node, ascending.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.peers.keys().copied().collect();
        ids.push(self.self_id);
        ids.sort_unstable();
        ids
    }

    /// Peer ids strictly higher than this node's, ascending.
    pub fn higher_ids(&self) -> Vec<NodeId> {
        self.peers
            .keys()
            .copied()
            .filter(|id| *id > self.self_id)
            .collect()
    }

    pub async fn leader(&self) -> NodeId {
        self.inner.read().await.leader
    }

    pub async fn learner(&self) -> Option<NodeId> {
        self.inner.read().await.learner
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    pub async fn is_live(&self) -> bool {
        self.inner.read().await.live
    }

    pub async fn is_leader(&self) -> bool {
        self.inner.read().await.leader == self.self_id
    }

    pub async fn is_learner(&self) -> bool {
        self.inner.read().await.learner == Some(self.self_id)
    }

    /// Current role of this node.
    pub async fn role(&self) -> Role {
        let inner = self.inner.read().await;
        if inner.leader == self.self_id {
            Role::Leader
        } else if inner.learner == Some(self.self_id) {
            Role::Learner
        } else {
            Role::Worker
        }
    }

    /// One consistent snapshot of `(leader, learner, epoch, live)`.
    pub async fn snapshot(&self) -> (NodeId, Option<NodeId>, u64, bool) {
        let inner = self.inner.read().await;
        (inner.leader, inner.learner, inner.epoch, inner.live)
    }

    /// Flip the administrative liveness switch.
    pub async fn set_live(&self, up: bool) {
        {
            let mut inner = self.inner.write().await;
            inner.live = up;
        }
        info!(node_id = %self.self_id, up, "liveness switched");
        let line = if up { "node back up" } else { "node going down" };
        self.notify(NodeEvent::Status(format!("node {}: {line}", self.self_id)));
    }

    /// Declare this node leader, bumping the epoch. Returns the epoch.
    pub async fn declare_self_leader(&self) -> u64 {
        let epoch = {
            let mut inner = self.inner.write().await;
            inner.epoch += 1;
            inner.leader = self.self_id;
            // A leader never doubles as learner.
            if inner.learner == Some(self.self_id) {
                inner.learner = None;
            }
            inner.epoch
        };
        info!(node_id = %self.self_id, epoch, "declared self leader");
        self.notify(NodeEvent::LeaderChanged {
            leader: self.self_id,
            epoch,
        });
        epoch
    }

    /// Apply a leader announcement.
    ///
    /// Accepted when stamped with an epoch at least as new as the one
    /// already applied (last writer wins). Returns whether it took.
    pub async fn apply_leader(&self, leader: NodeId, epoch: u64) -> bool {
        {
            let mut inner = self.inner.write().await;
            if epoch < inner.epoch {
                warn!(%leader, epoch, current = inner.epoch, "ignoring stale leader announcement");
                return false;
            }
            inner.epoch = epoch;
            inner.leader = leader;
            if inner.learner == Some(leader) {
                inner.learner = None;
            }
        }
        info!(%leader, epoch, "applied leader announcement");
        self.notify(NodeEvent::LeaderChanged { leader, epoch });
        true
    }

    /// Apply a learner assignment, under the same epoch rule as leader
    /// announcements.
    pub async fn apply_learner(&self, learner: NodeId, epoch: u64) -> bool {
        {
            let mut inner = self.inner.write().await;
            if epoch < inner.epoch {
                warn!(%learner, epoch, current = inner.epoch, "ignoring stale learner assignment");
                return false;
            }
            inner.epoch = epoch;
            inner.learner = Some(learner);
        }
        info!(%learner, epoch, "applied learner assignment");
        self.notify(NodeEvent::LearnerChanged {
            learner: Some(learner),
            epoch,
        });
        true
    }

    /// Forget the learner after an exhausted scan. Local only; peers
    /// keep whatever they believe until the next assignment.
    pub async fn clear_learner(&self) {
        let epoch = {
            let mut inner = self.inner.write().await;
            inner.learner = None;
            inner.epoch
        };
        warn!(node_id = %self.self_id, "no learner available");
        self.notify(NodeEvent::LearnerChanged {
            learner: None,
            epoch,
        });
    }
}

impl std::fmt::Debug for ClusterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterView")
            .field("self_id", &self.self_id)
            .field("self_addr", &self.self_addr)
            .finish_non_exhaustive()
    }
}
