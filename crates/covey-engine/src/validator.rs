//! Retrieval checks.
//!
//! A retrieval runs in two phases: every peer re-reads and re-hashes its
//! chunks of the file and reports them to the learner; the learner
//! cross-checks each report against its recorded table, collects the
//! matches for a settle window and flushes them to the current leader,
//! which publishes the download plan.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use covey_cluster::ClusterView;
use covey_net::{Message, Transport};
use covey_types::{ChunkHash, ChunkRecord, DownloadDescriptor, NodeEvent, NodeId, ValidatedChunk};

use crate::node::Node;
use crate::pending::{RecordOutcome, RetrievalRounds};

impl Node {
    /// Drive a retrieval round for a file: ask every peer to re-check its
    /// chunks, then re-check our own.
    pub(crate) async fn start_retrieval(&self, file_name: &str) {
        info!(file_name, "starting retrieval round");
        if self.view.is_learner().await {
            self.rounds.begin(file_name);
        }

        let mut requests = JoinSet::new();
        for (&id, addr) in self.view.peers() {
            let transport = self.transport.clone();
            let addr = addr.clone();
            let msg = Message::ChunkRequest {
                node_id: self.view.self_id(),
                file_name: file_name.to_string(),
            };
            requests.spawn(async move {
                if let Err(error) = transport.request(&addr, msg).await {
                    debug!(%error, peer = %id, "chunk request not delivered");
                }
            });
        }
        while requests.join_next().await.is_some() {}

        self.report_holdings(file_name).await;
    }

    /// Re-read this node's chunks of a file and report fresh hashes to
    /// the learner. Chunks that cannot be re-read are left out of the
    /// report.
    pub(crate) async fn report_holdings(&self, file_name: &str) {
        let recorded = self
            .table
            .read()
            .await
            .records_for_file(self.view.self_addr(), file_name);
        if recorded.is_empty() {
            debug!(file_name, "no local chunks to report");
            return;
        }

        let mut chunks = Vec::with_capacity(recorded.len());
        for record in recorded {
            match self.store.get(&record.chunk_name).await {
                Ok(Some(bytes)) => {
                    let mut fresh = record;
                    fresh.content_hash = ChunkHash::from_data(&bytes);
                    chunks.push(fresh);
                }
                Ok(None) => {
                    warn!(chunk = %record.chunk_name, "recorded chunk missing from the store")
                }
                Err(error) => {
                    warn!(%error, chunk = %record.chunk_name, "cannot re-read recorded chunk")
                }
            }
        }
        if chunks.is_empty() {
            return;
        }

        let Some(learner) = self.view.learner().await else {
            debug!(file_name, "no learner to report holdings to");
            return;
        };
        if learner == self.view.self_id() {
            self.record_report(learner, file_name, chunks).await;
            return;
        }
        let Some(addr) = self.view.addr_of(learner) else {
            warn!(learner = %learner, "unknown learner address");
            return;
        };

        let report = Message::ChunkValidate {
            node_id: self.view.self_id(),
            file_name: file_name.to_string(),
            chunks,
        };
        match self.transport.request(addr, report).await {
            Ok(Message::Ack) => debug!(file_name, "holdings reported to the learner"),
            Ok(reply) => debug!(?reply, file_name, "holdings report rejected"),
            Err(error) => warn!(%error, file_name, "failed to report holdings"),
        }
    }

    /// Cross-check a holder's report against the recorded table and fold
    /// the matches into the file's retrieval round.
    pub(crate) async fn record_report(
        &self,
        reporter: NodeId,
        file_name: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Message {
        if !self.view.is_learner().await {
            warn!(from = %reporter, file_name, "holder report arrived at a non-learner");
            return Message::Refused {
                reason: "not the learner".to_string(),
            };
        }

        let holder = if reporter == self.view.self_id() {
            self.view.self_addr().to_string()
        } else {
            match self.view.addr_of(reporter) {
                Some(addr) => addr.to_string(),
                None => {
                    warn!(from = %reporter, "holder report from an unknown node");
                    return Message::Refused {
                        reason: "unknown reporter".to_string(),
                    };
                }
            }
        };

        let recorded = self.table.read().await.records_for_file(&holder, file_name);
        let mut validated = Vec::new();
        for reported in chunks {
            let matches = recorded.iter().any(|known| {
                known.chunk_name == reported.chunk_name
                    && known.content_hash == reported.content_hash
            });
            if matches {
                validated.push(ValidatedChunk {
                    record: ChunkRecord {
                        valid: true,
                        ..reported
                    },
                    holder: holder.clone(),
                });
            } else {
                warn!(chunk = %reported.chunk_name, %holder, "reported chunk does not match the recorded hash");
            }
        }
        if validated.is_empty() {
            debug!(%holder, file_name, "nothing validated from this report");
            return Message::Ack;
        }

        let outcome = self.rounds.record(file_name, validated, || {
            let rounds = self.rounds.clone();
            let view = self.view.clone();
            let transport = self.transport.clone();
            let file_name = file_name.to_string();
            let window = self.config.settle_window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                flush_round(rounds, view, transport, &file_name).await;
            })
        });
        match outcome {
            RecordOutcome::Armed => debug!(file_name, "retrieval round opened, settle timer armed"),
            RecordOutcome::Appended => debug!(file_name, %holder, "report joined the running round"),
            RecordOutcome::Late => {
                debug!(file_name, %holder, "late report dropped, round already settled")
            }
        }
        Message::Ack
    }
}

/// Flush a settled round to the current leader.
async fn flush_round(
    rounds: Arc<RetrievalRounds>,
    view: Arc<ClusterView>,
    transport: Arc<dyn Transport>,
    file_name: &str,
) {
    let Some(chunks) = rounds.settle(file_name) else {
        debug!(file_name, "no retrieval round left to flush");
        return;
    };

    let leader = view.leader().await;
    if leader == view.self_id() {
        publish_locations(&view, file_name, &chunks);
        return;
    }
    let Some(addr) = view.addr_of(leader) else {
        warn!(leader = %leader, "unknown leader address, dropping chunk list");
        return;
    };

    let msg = Message::ChunkList {
        file_name: file_name.to_string(),
        chunks,
    };
    match transport.request(addr, msg).await {
        Ok(Message::Ack) => {
            info!(file_name, leader = %leader, "retrieval round flushed to the leader")
        }
        Ok(reply) => warn!(?reply, file_name, "leader rejected the chunk list"),
        Err(error) => warn!(%error, file_name, "failed to deliver the chunk list"),
    }
}

/// Publish the download plan for a file to observers. The internal
/// content hashes stay inside the cluster.
pub(crate) fn publish_locations(view: &ClusterView, file_name: &str, chunks: &[ValidatedChunk]) {
    let descriptors: Vec<DownloadDescriptor> =
        chunks.iter().map(ValidatedChunk::descriptor).collect();
    info!(file_name, chunks = descriptors.len(), "file available for download");
    view.notify(NodeEvent::ChunkLocations {
        file_name: file_name.to_string(),
        descriptors,
    });
}
