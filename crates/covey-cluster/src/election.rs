//! Bully-style leader election and learner selection.
//!
//! A node that suspects the leader challenges every strictly higher id.
//! The first accepter is told to run its own round; if nobody accepts
//! within the challenge window, the challenger declares itself leader,
//! announces the win to everyone and scans for a learner. No quorum is
//! involved: whoever is highest among the nodes that answer wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use covey_net::{Message, Transport};
use covey_types::{NodeEvent, NodeId};

use crate::state::ClusterView;

/// Timing and behavior knobs for elections and liveness probing.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// How long a challenger waits for a higher node to accept before
    /// declaring itself leader.
    pub challenge_window: Duration,
    /// Interval between leader liveness probes.
    pub probe_interval: Duration,
    /// Grace period after boot before the first probe.
    pub boot_delay: Duration,
    /// Whether an administratively downed node may still start and win
    /// elections. It keeps rejecting challenges while down either way.
    pub participate_while_down: bool,
}

impl ElectionConfig {
    /// Fast timings for tests.
    pub fn test_config() -> Self {
        Self {
            challenge_window: Duration::from_millis(100),
            probe_interval: Duration::from_millis(200),
            boot_delay: Duration::from_millis(10),
            participate_while_down: false,
        }
    }

    /// Production timings.
    pub fn default_config() -> Self {
        Self {
            challenge_window: Duration::from_secs(5),
            probe_interval: Duration::from_secs(12),
            boot_delay: Duration::from_secs(3),
            participate_while_down: false,
        }
    }
}

/// Election coordinator for one node.
///
/// Owns the challenge/declare/announce flow and the learner scan that
/// follows a win. At most one round runs at a time; the `coordinating`
/// flag doubles as the answer to coordinator queries from peers.
pub struct Coordinator {
    view: Arc<ClusterView>,
    transport: Arc<dyn Transport>,
    config: ElectionConfig,
    coordinating: AtomicBool,
}

impl Coordinator {
    pub fn new(
        view: Arc<ClusterView>,
        transport: Arc<dyn Transport>,
        config: ElectionConfig,
    ) -> Self {
        Self {
            view,
            transport,
            config,
            coordinating: AtomicBool::new(false),
        }
    }

    /// Whether an election round is currently running here.
    pub fn is_coordinating(&self) -> bool {
        self.coordinating.load(Ordering::SeqCst)
    }

    /// Drop coordinator status, e.g. when the node is downed.
    pub fn reset(&self) {
        self.coordinating.store(false, Ordering::SeqCst);
    }

    /// Answer an election challenge.
    ///
    /// Accepts whenever this node is up. The challenger's rank is not
    /// checked; only lower nodes ever challenge.
    pub async fn handle_challenge(&self, challenger: NodeId) -> bool {
        let accept = self.view.is_live().await;
        debug!(%challenger, accept, "election challenge");
        accept
    }

    /// Apply a leader announcement from the wire.
    pub async fn handle_new_leader(&self, leader: NodeId, epoch: u64) -> bool {
        let applied = self.view.apply_leader(leader, epoch).await;
        if applied && leader != self.view.self_id() {
            // Someone else won; any round of ours is over.
            self.reset();
        }
        applied
    }

    /// Apply a learner assignment from the wire.
    pub async fn handle_new_learner(&self, learner: NodeId, epoch: u64) -> bool {
        self.view.apply_learner(learner, epoch).await
    }

    /// Run one full election round.
    ///
    /// Challenges all higher ids, defers to the first accepter, declares
    /// itself on timeout. Skipped while the node is administratively
    /// down (unless configured to participate) and while another round
    /// is already running.
    pub async fn run_election(&self) {
        if !self.view.is_live().await && !self.config.participate_while_down {
            debug!("down, not starting an election");
            return;
        }
        if self.coordinating.swap(true, Ordering::SeqCst) {
            debug!("election already running");
            return;
        }
        info!(node_id = %self.view.self_id(), "starting election");
        self.view.notify(NodeEvent::Status(format!(
            "node {} coordinating an election",
            self.view.self_id()
        )));

        match self.challenge_higher().await {
            Some(accepter) => {
                info!(%accepter, "deferring to higher node");
                self.instruct(accepter).await;
            }
            None => self.become_leader().await,
        }

        self.coordinating.store(false, Ordering::SeqCst);
    }

    /// Challenge every strictly higher id; return the first accepter.
    async fn challenge_higher(&self) -> Option<NodeId> {
        let higher = self.view.higher_ids();
        if higher.is_empty() {
            return None;
        }

        let mut challenges = JoinSet::new();
        for id in higher {
            let Some(addr) = self.view.addr_of(id).map(str::to_string) else {
                continue;
            };
            let transport = self.transport.clone();
            let self_id = self.view.self_id();
            challenges.spawn(async move {
                let reply = transport
                    .request(&addr, Message::Election { node_id: self_id })
                    .await;
                (id, reply)
            });
        }

        let first_accept = async {
            while let Some(joined) = challenges.join_next().await {
                match joined {
                    Ok((id, Ok(Message::ElectionReply { accept: true }))) => return Some(id),
                    Ok((id, Ok(Message::ElectionReply { accept: false }))) => {
                        debug!(node_id = %id, "challenge rejected");
                    }
                    Ok((id, Ok(other))) => {
                        warn!(node_id = %id, ?other, "unexpected challenge reply");
                    }
                    Ok((id, Err(e))) => {
                        debug!(node_id = %id, error = %e, "challenge failed");
                    }
                    Err(e) => warn!(error = %e, "challenge task failed"),
                }
            }
            None
        };

        match tokio::time::timeout(self.config.challenge_window, first_accept).await {
            Ok(accepter) => accepter,
            // Window elapsed; challenges still in flight are dropped
            // with the set.
            Err(_) => None,
        }
    }

    /// Tell the first accepter to run its own round.
    async fn instruct(&self, accepter: NodeId) {
        let Some(addr) = self.view.addr_of(accepter) else {
            return;
        };
        let msg = Message::BecomeCoordinator {
            node_id: self.view.self_id(),
        };
        if let Err(e) = self.transport.request(addr, msg).await {
            // The accepter may have died right after accepting; the
            // liveness monitor will escalate again.
            warn!(node_id = %accepter, error = %e, "coordinator hand-off failed");
        }
    }

    /// Declare this node leader, announce the win and pick a learner.
    async fn become_leader(&self) {
        let epoch = self.view.declare_self_leader().await;
        self.view.notify(NodeEvent::Status(format!(
            "node {} is now the leader",
            self.view.self_id()
        )));

        self.broadcast(Message::NewLeader {
            leader: self.view.self_id(),
            epoch,
        })
        .await;
        self.select_learner(epoch).await;
    }

    /// Scan for a learner, lowest id first, skipping this node.
    ///
    /// The first candidate already calling itself learner is adopted and
    /// its catalog pulled; otherwise the first candidate that answers at
    /// all (even a downed one) is assigned and the assignment broadcast.
    /// If the scan exhausts the cluster the learner slot stays empty
    /// until the next election.
    pub async fn select_learner(&self, epoch: u64) {
        for id in self.view.all_ids() {
            if id == self.view.self_id() {
                continue;
            }
            let Some(addr) = self.view.addr_of(id) else {
                continue;
            };
            let probe = Message::LearnerProbe {
                node_id: self.view.self_id(),
            };
            match self.transport.request(addr, probe).await {
                Ok(Message::LearnerProbeReply {
                    is_learner: true,
                    files,
                    ..
                }) => {
                    info!(learner = %id, "adopted self-identified learner");
                    self.view.apply_learner(id, epoch).await;
                    self.view.notify(NodeEvent::CatalogUpdated { files });
                    return;
                }
                Ok(Message::LearnerProbeReply { .. }) => {
                    info!(learner = %id, "assigning learner");
                    self.view.apply_learner(id, epoch).await;
                    self.broadcast(Message::NewLearner { learner: id, epoch })
                        .await;
                    return;
                }
                Ok(other) => {
                    warn!(node_id = %id, ?other, "unexpected learner probe reply");
                }
                Err(e) => {
                    debug!(node_id = %id, error = %e, "learner candidate unreachable");
                }
            }
        }
        self.view.clear_learner().await;
    }

    /// Send a message to every peer, draining failures as log lines.
    async fn broadcast(&self, msg: Message) {
        let mut sends = JoinSet::new();
        for (id, addr) in self.view.peers() {
            let id = *id;
            let addr = addr.clone();
            let msg = msg.clone();
            let transport = self.transport.clone();
            sends.spawn(async move { (id, transport.request(&addr, msg).await) });
        }
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((id, Err(e))) => {
                    debug!(node_id = %id, error = %e, "announcement not delivered");
                }
                Err(e) => warn!(error = %e, "announcement task failed"),
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("coordinating", &self.is_coordinating())
            .finish_non_exhaustive()
    }
}
