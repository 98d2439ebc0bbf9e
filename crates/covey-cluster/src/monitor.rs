//! Leader liveness monitor.
//!
//! Every node probes the current leader on a fixed interval after a boot
//! grace period, and escalates straight into an election when the probe
//! fails or the leader reports itself down. Probing is skipped while the
//! probing node is administratively down and while it is the leader
//! itself.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use covey_net::{Message, Transport};
use covey_types::NodeStatus;

use crate::election::{Coordinator, ElectionConfig};
use crate::state::ClusterView;

/// Handle to a running liveness monitor.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to stop after its current probe.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Abort the monitor task immediately.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Start the liveness monitor for a node.
pub fn start(
    view: Arc<ClusterView>,
    coordinator: Arc<Coordinator>,
    transport: Arc<dyn Transport>,
    config: ElectionConfig,
) -> MonitorHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = LivenessMonitor {
        view,
        coordinator,
        transport,
        config,
    };
    let task = tokio::spawn(monitor.run(shutdown_rx));
    MonitorHandle { shutdown_tx, task }
}

struct LivenessMonitor {
    view: Arc<ClusterView>,
    coordinator: Arc<Coordinator>,
    transport: Arc<dyn Transport>,
    config: ElectionConfig,
}

impl LivenessMonitor {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(node_id = %self.view.self_id(), "liveness monitor started");

        // Boot grace period before the first probe.
        tokio::select! {
            _ = tokio::time::sleep(self.config.boot_delay) => {}
            _ = shutdown_rx.changed() => {
                debug!("liveness monitor stopped during boot delay");
                return;
            }
        }

        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_leader().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!("liveness monitor stopped");
                    break;
                }
            }
        }
    }

    /// Probe the current leader once, escalating to an election on any
    /// outcome other than a healthy reply.
    async fn probe_leader(&self) {
        if !self.view.is_live().await {
            debug!("down, skipping leader probe");
            return;
        }
        let leader = self.view.leader().await;
        if leader == self.view.self_id() {
            return;
        }
        let Some(addr) = self.view.addr_of(leader).map(str::to_string) else {
            warn!(%leader, "no address for leader");
            return;
        };

        let probe = Message::Ping {
            node_id: self.view.self_id(),
        };
        match self.transport.request(&addr, probe).await {
            Ok(Message::PingReply {
                status: NodeStatus::Ok,
            }) => {
                debug!(%leader, "leader alive");
            }
            Ok(Message::PingReply {
                status: NodeStatus::Down,
            }) => {
                info!(%leader, "leader reports down, starting election");
                self.coordinator.run_election().await;
            }
            Ok(other) => {
                warn!(%leader, ?other, "unexpected ping reply, starting election");
                self.coordinator.run_election().await;
            }
            Err(e) => {
                info!(%leader, error = %e, "leader unreachable, starting election");
                self.coordinator.run_election().await;
            }
        }
    }
}
