//! Shared test harness for Covey integration tests.
//!
//! Provides [`TcpCluster`] — N real nodes on loopback sockets, each with
//! its own listener, file-backed stores and liveness monitor. Tests talk
//! to the nodes over the same TCP transport the daemon uses, and can
//! additionally observe a node's event channel in-process.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use covey_cluster::{ClusterView, MonitorHandle, monitor};
use covey_engine::{Node, NodeConfig};
use covey_meta::DocStore;
use covey_net::{Message, MessageHandler, TcpTransport, Transport};
use covey_store::{ChunkStore, FileStore};
use covey_types::{DownloadDescriptor, NodeEvent, NodeId, StatusReport};

pub struct TcpCluster {
    nodes: Vec<Arc<Node>>,
    addrs: Vec<String>,
    stores: Vec<Arc<FileStore>>,
    transport: Arc<dyn Transport>,
    servers: Vec<JoinHandle<()>>,
    server_shutdowns: Vec<watch::Sender<bool>>,
    monitors: Vec<MonitorHandle>,
    _dirs: Vec<TempDir>,
}

impl TcpCluster {
    /// Start an N-node cluster on ephemeral loopback ports.
    ///
    /// Node ids rank the nodes by port, matching the daemon's id
    /// derivation: the highest port is the seeded leader, the lowest the
    /// seeded learner.
    pub async fn start(n: usize) -> Result<Self> {
        assert!(n >= 2, "need at least 2 nodes");

        let mut listeners = Vec::with_capacity(n);
        for _ in 0..n {
            listeners.push(
                TcpListener::bind("127.0.0.1:0")
                    .await
                    .context("failed to bind test listener")?,
            );
        }
        listeners.sort_by_key(|listener| {
            listener.local_addr().expect("listener has an address").port()
        });
        let addrs: Vec<String> = listeners
            .iter()
            .map(|listener| listener.local_addr().expect("listener has an address").to_string())
            .collect();

        let transport: Arc<dyn Transport> =
            Arc::new(TcpTransport::new(Duration::from_secs(2)));
        let config = NodeConfig::test_config();

        let mut nodes = Vec::with_capacity(n);
        let mut stores = Vec::with_capacity(n);
        let mut servers = Vec::with_capacity(n);
        let mut server_shutdowns = Vec::with_capacity(n);
        let mut monitors = Vec::with_capacity(n);
        let mut dirs = Vec::with_capacity(n);

        for (i, listener) in listeners.into_iter().enumerate() {
            let self_id = NodeId::new(i as u16);
            let peers: BTreeMap<NodeId, String> = addrs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, addr)| (NodeId::new(j as u16), addr.clone()))
                .collect();

            let dir = tempfile::tempdir().context("failed to create node dir")?;
            let store = Arc::new(
                FileStore::open(dir.path())
                    .await
                    .context("failed to open chunk store")?,
            );
            let docs = Arc::new(
                DocStore::open(dir.path().join("docs")).context("failed to open doc store")?,
            );

            let view = ClusterView::new(self_id, addrs[i].clone(), peers);
            let node = Arc::new(
                Node::new(
                    view,
                    transport.clone(),
                    store.clone() as Arc<dyn ChunkStore>,
                    docs,
                    config.clone(),
                )
                .await
                .context("failed to build node")?,
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handler: Arc<dyn MessageHandler> = node.clone();
            servers.push(tokio::spawn(covey_net::serve(listener, handler, shutdown_rx)));
            monitors.push(monitor::start(
                node.view().clone(),
                node.coordinator().clone(),
                transport.clone(),
                config.election.clone(),
            ));

            nodes.push(node);
            stores.push(store);
            server_shutdowns.push(shutdown_tx);
            dirs.push(dir);
        }

        Ok(Self {
            nodes,
            addrs,
            stores,
            transport,
            servers,
            server_shutdowns,
            monitors,
            _dirs: dirs,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// In-process handle to node `i`, for event subscriptions.
    pub fn node(&self, i: usize) -> &Arc<Node> {
        &self.nodes[i]
    }

    pub fn addr(&self, i: usize) -> &str {
        &self.addrs[i]
    }

    /// The node index listening on `addr`.
    pub fn index_of(&self, addr: &str) -> Option<usize> {
        self.addrs.iter().position(|a| a == addr)
    }

    /// Direct access to node `i`'s chunk files.
    pub fn store(&self, i: usize) -> &Arc<FileStore> {
        &self.stores[i]
    }

    /// Send one request to node `i` over TCP.
    pub async fn request(&self, i: usize, msg: Message) -> Result<Message> {
        self.transport
            .request(&self.addrs[i], msg)
            .await
            .with_context(|| format!("request to node {i} failed"))
    }

    /// Query node `i`'s status report over TCP.
    pub async fn status(&self, i: usize) -> Result<StatusReport> {
        match self.request(i, Message::StatusQuery).await? {
            Message::StatusReply { report } => Ok(report),
            other => bail!("unexpected status reply: {other:?}"),
        }
    }

    /// Stop node `i`'s listener and monitor, as if the process died.
    ///
    /// The node stops answering new connections; peers see connection
    /// errors from then on.
    pub fn kill(&self, i: usize) {
        let _ = self.server_shutdowns[i].send(true);
        self.monitors[i].abort();
        self.servers[i].abort();
    }
}

/// Poll a condition until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Wait for the next published set of download descriptors, skipping any
/// other events in between.
pub async fn next_locations(
    events: &mut broadcast::Receiver<NodeEvent>,
) -> (String, Vec<DownloadDescriptor>) {
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no retrieval result within 5s")
            .expect("event channel closed");
        if let NodeEvent::ChunkLocations {
            file_name,
            descriptors,
        } = event
        {
            return (file_name, descriptors);
        }
    }
}

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}
