//! Chunk placement: split an uploaded file over a ring of active workers.
//!
//! The driving node probes its peers, splits the file per the ring
//! layout, pushes every worker its parts and ships the resulting records
//! to the learner. Failures shrink the placement; they never fail the
//! upload.

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use covey_net::Message;
use covey_placement::{part_count, plan, split_into};
use covey_types::{
    ChunkHash, ChunkRecord, NodeChunkTable, NodeEvent, NodeId, NodeStatus, chunk_name,
    chunk_storage_path,
};

use crate::node::Node;

impl Node {
    /// Place an uploaded file in the cluster.
    ///
    /// The driving node and the current learner never hold parts; every
    /// other peer that answers a liveness probe does. Individual push
    /// failures drop that chunk's record and nothing more.
    pub(crate) async fn place_file(&self, file_name: &str, data: &[u8]) {
        let workers = self.probe_active_workers().await;
        if workers.is_empty() {
            warn!(file_name, "no active workers, dropping upload");
            return;
        }

        let parts = split_into(data, part_count(workers.len()));
        info!(
            file_name,
            size = data.len(),
            workers = workers.len(),
            parts = parts.len(),
            "placing file"
        );

        // One task per worker; within a task the worker's parts are sent
        // in order so its records land in push order.
        let mut pushes: JoinSet<(String, Vec<ChunkRecord>)> = JoinSet::new();
        for assignment in plan(workers.len()) {
            let (worker_id, addr) = workers[assignment.position].clone();
            let transport = self.transport.clone();
            let file_name = file_name.to_string();
            let chunks: Vec<(usize, Vec<u8>)> = assignment
                .parts
                .iter()
                .map(|&part| (part, parts[part].clone()))
                .collect();

            pushes.spawn(async move {
                let mut records = Vec::with_capacity(chunks.len());
                for (part, bytes) in chunks {
                    let chunk_name = chunk_name(&file_name, part as u32);
                    let record = ChunkRecord {
                        file_name: file_name.clone(),
                        chunk_name: chunk_name.clone(),
                        part_index: part as u32,
                        storage_path: chunk_storage_path(&chunk_name),
                        content_hash: ChunkHash::from_data(&bytes),
                        valid: false,
                    };
                    let push = Message::ChunkPush {
                        file_name: file_name.clone(),
                        chunk_name: chunk_name.clone(),
                        part_index: part as u32,
                        data: bytes,
                    };
                    match transport.request(&addr, push).await {
                        Ok(Message::Ack) => records.push(record),
                        Ok(reply) => {
                            warn!(chunk = %chunk_name, worker = %worker_id, ?reply, "chunk push refused")
                        }
                        Err(error) => {
                            warn!(%error, chunk = %chunk_name, worker = %worker_id, "chunk push failed")
                        }
                    }
                }
                (addr, records)
            });
        }

        let mut placement = NodeChunkTable::new();
        while let Some(result) = pushes.join_next().await {
            if let Ok((addr, records)) = result {
                placement.append(&addr, records);
            }
        }

        if placement.is_empty() {
            warn!(file_name, "no chunk landed anywhere, nothing to record");
            return;
        }
        self.add_files([file_name.to_string()]).await;
        self.ship_placement(placement).await;
        self.view.notify(NodeEvent::CatalogUpdated {
            files: self.catalog_files().await,
        });
    }

    /// Ping every peer except the current learner; the responders that
    /// report themselves up become this placement's workers, ordered by
    /// id.
    async fn probe_active_workers(&self) -> Vec<(NodeId, String)> {
        let learner = self.view.learner().await;
        let mut probes: JoinSet<Option<(NodeId, String)>> = JoinSet::new();
        for (&id, addr) in self.view.peers() {
            if Some(id) == learner {
                continue;
            }
            let transport = self.transport.clone();
            let addr = addr.clone();
            let self_id = self.view.self_id();
            probes.spawn(async move {
                match transport
                    .request(&addr, Message::Ping { node_id: self_id })
                    .await
                {
                    Ok(Message::PingReply {
                        status: NodeStatus::Ok,
                    }) => Some((id, addr)),
                    Ok(_) => {
                        debug!(peer = %id, "peer not available for placement");
                        None
                    }
                    Err(error) => {
                        debug!(%error, peer = %id, "peer unreachable for placement");
                        None
                    }
                }
            });
        }

        let mut workers = Vec::new();
        while let Some(result) = probes.join_next().await {
            if let Ok(Some(worker)) = result {
                workers.push(worker);
            }
        }
        workers.sort_by_key(|(id, _)| *id);
        workers
    }

    /// Send the placement records to the learner and adopt the catalog it
    /// replies with.
    async fn ship_placement(&self, placement: NodeChunkTable) {
        let Some(learner) = self.view.learner().await else {
            warn!("no learner, placement records stay unaggregated");
            return;
        };
        let Some(addr) = self.view.addr_of(learner) else {
            warn!(learner = %learner, "unknown learner address");
            return;
        };

        let msg = Message::ChunkMetadata {
            node_id: self.view.self_id(),
            table: placement,
        };
        match self.transport.request(addr, msg).await {
            Ok(Message::ChunkMetadataReply { files }) => {
                debug!(files = files.len(), "learner merged placement records");
                self.add_files(files).await;
            }
            Ok(reply) => warn!(?reply, "learner rejected placement records"),
            Err(error) => warn!(%error, "failed to ship placement records to the learner"),
        }
    }
}
