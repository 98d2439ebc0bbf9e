//! [`Node`] — the orchestrator that ties all Covey components together.
//!
//! A `Node` owns the local chunk store, the doc-store, the cluster view
//! and the election coordinator, and serves the whole RPC surface:
//! liveness and election traffic, chunk placement, learner-side metadata
//! aggregation and the retrieval check protocol.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use covey_cluster::{ClusterView, Coordinator, ElectionConfig};
use covey_meta::{DocStore, doc_name};
use covey_net::{Message, MessageHandler, Transport};
use covey_store::ChunkStore;
use covey_types::{
    ChunkHash, ChunkRecord, NodeChunkTable, NodeEvent, NodeId, NodeStatus, StatusReport,
    ValidatedChunk,
};

use crate::error::EngineError;
use crate::pending::RetrievalRounds;
use crate::validator::publish_locations;

/// Configuration for creating a [`Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How long the learner collects holder reports before flushing a
    /// retrieval round to the leader.
    pub settle_window: Duration,
    /// Election and liveness probing knobs.
    pub election: ElectionConfig,
}

impl NodeConfig {
    /// Fast timings for tests.
    pub fn test_config() -> Self {
        Self {
            settle_window: Duration::from_millis(150),
            election: ElectionConfig::test_config(),
        }
    }

    /// Production defaults.
    pub fn default_config() -> Self {
        Self {
            settle_window: Duration::from_secs(5),
            election: ElectionConfig::default_config(),
        }
    }
}

/// The node orchestrator.
///
/// Wired up once at startup and then driven entirely by inbound messages
/// (it implements [`MessageHandler`]) plus the liveness monitor running
/// against its coordinator.
pub struct Node {
    pub(crate) view: Arc<ClusterView>,
    pub(crate) coordinator: Arc<Coordinator>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn ChunkStore>,
    pub(crate) docs: Arc<DocStore>,
    /// This node's chunk table: own holdings on a worker, the merged
    /// cluster-wide table on the learner.
    pub(crate) table: Arc<RwLock<NodeChunkTable>>,
    /// Files this node believes exist in the cluster.
    pub(crate) catalog: Arc<RwLock<BTreeSet<String>>>,
    pub(crate) rounds: Arc<RetrievalRounds>,
    pub(crate) config: NodeConfig,
    catalog_task: JoinHandle<()>,
}

impl Node {
    /// Create a node, reloading its chunk table from the doc-store.
    pub async fn new(
        view: Arc<ClusterView>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn ChunkStore>,
        docs: Arc<DocStore>,
        config: NodeConfig,
    ) -> Result<Self, EngineError> {
        let coordinator = Arc::new(Coordinator::new(
            view.clone(),
            transport.clone(),
            config.election.clone(),
        ));

        let doc = doc_name(view.self_id(), view.is_learner().await);
        let table = docs.read_table(&doc)?;
        if !table.is_empty() {
            info!(doc, records = table.record_count(), "reloaded chunk table");
        }
        let catalog: BTreeSet<String> = table.file_names().into_iter().collect();
        let catalog = Arc::new(RwLock::new(catalog));

        // Catalog updates can originate outside this node's own handlers,
        // e.g. when the coordinator adopts a learner and pulls its file
        // list. Follow the view's event stream to pick those up.
        let catalog_task = tokio::spawn(follow_catalog(view.subscribe(), catalog.clone()));

        Ok(Self {
            view,
            coordinator,
            transport,
            store,
            docs,
            table: Arc::new(RwLock::new(table)),
            catalog,
            rounds: Arc::new(RetrievalRounds::new()),
            config,
            catalog_task,
        })
    }

    /// Return a reference to the cluster view.
    pub fn view(&self) -> &Arc<ClusterView> {
        &self.view
    }

    /// Return a reference to the election coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub(crate) async fn catalog_files(&self) -> Vec<String> {
        self.catalog.read().await.iter().cloned().collect()
    }

    pub(crate) async fn add_files(&self, files: impl IntoIterator<Item = String>) {
        self.catalog.write().await.extend(files);
    }

    /// Persist the chunk table under this node's role-derived doc name.
    ///
    /// Persistence failures degrade to a warning; the in-memory table
    /// keeps serving and the learner can rebuild a worker's rows from the
    /// next placement.
    pub(crate) async fn persist_table(&self) {
        let doc = doc_name(self.view.self_id(), self.view.is_learner().await);
        let table = self.table.read().await.clone();
        if let Err(error) = self.docs.write_table(&doc, &table) {
            warn!(%error, doc, "failed to persist chunk table");
        }
    }

    async fn live_status(&self) -> NodeStatus {
        if self.view.is_live().await {
            NodeStatus::Ok
        } else {
            NodeStatus::Down
        }
    }

    pub(crate) async fn status(&self) -> StatusReport {
        let (leader, learner, epoch, live) = self.view.snapshot().await;
        StatusReport {
            node_id: self.view.self_id(),
            role: self.view.role().await,
            live,
            leader,
            learner,
            epoch,
            files: self.catalog_files().await,
        }
    }

    // ------------------------------------------------------------------
    // Role traffic
    // ------------------------------------------------------------------

    async fn apply_new_learner(&self, learner: NodeId, epoch: u64) -> Message {
        let was_learner = self.view.is_learner().await;
        let applied = self.coordinator.handle_new_learner(learner, epoch).await;
        if applied {
            let is_learner = self.view.is_learner().await;
            if is_learner && !was_learner {
                self.reload_learner_table().await;
            } else if was_learner && !is_learner {
                // A round must not be flushed by a node that no longer
                // arbitrates retrievals.
                self.rounds.cancel_all();
            }
        }
        Message::Ack
    }

    /// Replace the in-memory table with the persisted learner doc when
    /// this node takes over the learner role.
    async fn reload_learner_table(&self) {
        let doc = doc_name(self.view.self_id(), true);
        match self.docs.read_table(&doc) {
            Ok(table) => {
                info!(doc, records = table.record_count(), "assumed learner role");
                self.add_files(table.file_names()).await;
                *self.table.write().await = table;
            }
            Err(error) => warn!(%error, doc, "failed to reload learner table"),
        }
    }

    // ------------------------------------------------------------------
    // Chunk traffic
    // ------------------------------------------------------------------

    /// Store a pushed part and record it under this node's own address.
    async fn receive_chunk(
        &self,
        file_name: String,
        chunk_name: String,
        part_index: u32,
        data: Vec<u8>,
    ) -> Message {
        let content_hash = ChunkHash::from_data(&data);
        let storage_path = match self.store.put(&chunk_name, data.into()).await {
            Ok(path) => path,
            Err(error) => {
                warn!(%error, chunk = %chunk_name, "failed to store pushed chunk");
                return Message::Refused {
                    reason: error.to_string(),
                };
            }
        };
        debug!(chunk = %chunk_name, part = part_index, "stored pushed chunk");

        let record = ChunkRecord {
            file_name: file_name.clone(),
            chunk_name,
            part_index,
            storage_path,
            content_hash,
            valid: false,
        };
        {
            let mut table = self.table.write().await;
            table.append(self.view.self_addr(), vec![record]);
        }
        self.persist_table().await;
        self.add_files([file_name]).await;
        Message::Ack
    }

    async fn handle_chunk_request(&self, from: NodeId, file_name: &str) -> Message {
        debug!(from = %from, file_name, "chunk request");
        if self.view.is_learner().await {
            self.rounds.begin(file_name);
        }
        self.report_holdings(file_name).await;
        Message::Ack
    }

    async fn receive_chunk_list(&self, file_name: &str, chunks: Vec<ValidatedChunk>) -> Message {
        if !self.view.is_leader().await {
            warn!(file_name, "chunk list arrived at a non-leader");
            return Message::Refused {
                reason: "not the leader".to_string(),
            };
        }
        publish_locations(&self.view, file_name, &chunks);
        Message::Ack
    }

    // ------------------------------------------------------------------
    // Operator surface
    // ------------------------------------------------------------------

    async fn accept_upload(&self, file_name: String, data: Vec<u8>) -> Message {
        if self.view.is_learner().await && !self.view.is_leader().await {
            info!(file_name, "refusing upload, the learner does not take files");
            return Message::Refused {
                reason: "the learner does not accept uploads".to_string(),
            };
        }
        self.place_file(&file_name, &data).await;
        Message::Ack
    }

    async fn set_live(&self, up: bool) -> Message {
        self.view.set_live(up).await;
        if !up {
            self.coordinator.reset();
        }
        Message::Ack
    }
}

#[async_trait::async_trait]
impl MessageHandler for Node {
    async fn handle(&self, msg: Message) -> Message {
        match msg {
            Message::Ping { node_id } => {
                debug!(from = %node_id, "ping");
                Message::PingReply {
                    status: self.live_status().await,
                }
            }
            Message::LearnerProbe { node_id } => {
                debug!(from = %node_id, "learner probe");
                Message::LearnerProbeReply {
                    status: self.live_status().await,
                    is_learner: self.view.is_learner().await,
                    files: self.catalog_files().await,
                }
            }
            Message::CoordinatorQuery { .. } => Message::CoordinatorReply {
                coordinating: self.coordinator.is_coordinating(),
            },
            Message::Election { node_id } => Message::ElectionReply {
                accept: self.coordinator.handle_challenge(node_id).await,
            },
            Message::BecomeCoordinator { node_id } => {
                info!(from = %node_id, "instructed to coordinate an election");
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move { coordinator.run_election().await });
                Message::Ack
            }
            Message::NewLeader { leader, epoch } => {
                self.coordinator.handle_new_leader(leader, epoch).await;
                Message::Ack
            }
            Message::NewLearner { learner, epoch } => self.apply_new_learner(learner, epoch).await,
            Message::ChunkPush {
                file_name,
                chunk_name,
                part_index,
                data,
            } => {
                self.receive_chunk(file_name, chunk_name, part_index, data)
                    .await
            }
            Message::ChunkMetadata { node_id, table } => self.absorb_table(node_id, table).await,
            Message::ChunkRequest { node_id, file_name } => {
                self.handle_chunk_request(node_id, &file_name).await
            }
            Message::ChunkValidate {
                node_id,
                file_name,
                chunks,
            } => self.record_report(node_id, &file_name, chunks).await,
            Message::ChunkList { file_name, chunks } => {
                self.receive_chunk_list(&file_name, chunks).await
            }
            Message::Upload { file_name, data } => self.accept_upload(file_name, data).await,
            Message::Retrieve { file_name } => {
                self.start_retrieval(&file_name).await;
                Message::Ack
            }
            Message::SetLive { up } => self.set_live(up).await,
            Message::StatusQuery => Message::StatusReply {
                report: self.status().await,
            },
            Message::PingReply { .. }
            | Message::LearnerProbeReply { .. }
            | Message::CoordinatorReply { .. }
            | Message::ElectionReply { .. }
            | Message::ChunkMetadataReply { .. }
            | Message::StatusReply { .. }
            | Message::Ack
            | Message::Refused { .. } => {
                warn!("reply message arrived as a request");
                Message::Refused {
                    reason: "unexpected request".to_string(),
                }
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.catalog_task.abort();
    }
}

async fn follow_catalog(
    mut events: broadcast::Receiver<NodeEvent>,
    catalog: Arc<RwLock<BTreeSet<String>>>,
) {
    loop {
        match events.recv().await {
            Ok(NodeEvent::CatalogUpdated { files }) => {
                catalog.write().await.extend(files);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "catalog follower lagged behind the event stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
