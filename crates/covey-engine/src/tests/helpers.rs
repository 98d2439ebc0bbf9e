//! Shared test utilities for covey-engine tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use covey_cluster::ClusterView;
use covey_meta::DocStore;
use covey_net::{Message, MessageHandler, NetError, Transport};
use covey_store::MemoryStore;
use covey_types::{DownloadDescriptor, NodeEvent, NodeId};

use crate::node::{Node, NodeConfig};

pub fn addr_of(id: u16) -> String {
    format!("127.0.0.1:{}", 10000 + id)
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

/// Poll a condition until it holds or a deadline passes.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Wait for the next published set of download descriptors, skipping any
/// other events in between.
pub async fn next_locations(
    events: &mut broadcast::Receiver<NodeEvent>,
) -> (String, Vec<DownloadDescriptor>) {
    loop {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no retrieval result within 2s")
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

/// In-process transport that routes requests straight into the target
/// node's handler, with per-address failure injection.
pub struct MeshTransport {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    /// Addresses that fail every request, like a dead process.
    unreachable: RwLock<HashSet<String>>,
    /// Addresses that fail chunk pushes only, like a full disk.
    failing_pushes: RwLock<HashSet<String>>,
}

impl MeshTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: RwLock::new(HashMap::new()),
            unreachable: RwLock::new(HashSet::new()),
            failing_pushes: RwLock::new(HashSet::new()),
        })
    }

    pub fn register(&self, addr: String, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().unwrap().insert(addr, handler);
    }

    pub fn set_unreachable(&self, addr: &str) {
        self.unreachable.write().unwrap().insert(addr.to_string());
    }

    pub fn set_reachable(&self, addr: &str) {
        self.unreachable.write().unwrap().remove(addr);
    }

    pub fn fail_pushes_to(&self, addr: &str) {
        self.failing_pushes.write().unwrap().insert(addr.to_string());
    }
}

#[async_trait::async_trait]
impl Transport for MeshTransport {
    async fn request(&self, addr: &str, msg: Message) -> Result<Message, NetError> {
        if self.unreachable.read().unwrap().contains(addr) {
            return Err(NetError::Timeout(addr.to_string()));
        }
        if matches!(msg, Message::ChunkPush { .. })
            && self.failing_pushes.read().unwrap().contains(addr)
        {
            return Err(NetError::Timeout(addr.to_string()));
        }
        let handler = self.handlers.read().unwrap().get(addr).cloned();
        match handler {
            Some(handler) => Ok(handler.handle(msg).await),
            None => Err(NetError::Timeout(addr.to_string())),
        }
    }
}

/// An in-process cluster: one [`Node`] per id, all wired through a single
/// [`MeshTransport`]. Real deployments run one process per node; tests
/// get the same message flow without sockets.
pub struct TestCluster {
    pub nodes: Vec<Arc<Node>>,
    pub stores: Vec<Arc<MemoryStore>>,
    pub transport: Arc<MeshTransport>,
}

impl TestCluster {
    pub fn node(&self, id: u16) -> &Arc<Node> {
        &self.nodes[id as usize]
    }

    /// Send a message to a node the way a peer or operator would.
    pub async fn send(&self, id: u16, msg: Message) -> Message {
        self.transport
            .request(&addr_of(id), msg)
            .await
            .expect("test node unreachable")
    }
}

pub async fn build_cluster(n: u16) -> TestCluster {
    build_cluster_with(n, NodeConfig::test_config()).await
}

pub async fn build_cluster_with(n: u16, config: NodeConfig) -> TestCluster {
    let transport = MeshTransport::new();
    let mut nodes = Vec::new();
    let mut stores = Vec::new();

    for id in 0..n {
        let mut peers = BTreeMap::new();
        for peer in 0..n {
            if peer != id {
                peers.insert(NodeId::new(peer), addr_of(peer));
            }
        }
        let view = ClusterView::new(NodeId::new(id), addr_of(id), peers);
        let store = Arc::new(MemoryStore::new());
        let docs = Arc::new(DocStore::open_temporary().unwrap());
        let node = Arc::new(
            Node::new(
                view,
                transport.clone(),
                store.clone(),
                docs,
                config.clone(),
            )
            .await
            .unwrap(),
        );
        transport.register(addr_of(id), node.clone());
        stores.push(store);
        nodes.push(node);
    }

    TestCluster {
        nodes,
        stores,
        transport,
    }
}
