//! Learner-side metadata aggregation.
//!
//! Placement records shipped by driving nodes are appended into the
//! learner's table exactly as received. The append never deduplicates, so
//! a driver that ships the same rows twice doubles them; drivers ship
//! each placement's records once.

use std::collections::BTreeSet;

use tracing::{info, warn};

use covey_net::Message;
use covey_types::{NodeChunkTable, NodeEvent, NodeId};

use crate::node::Node;

impl Node {
    /// Merge shipped placement records into the learner's table, persist
    /// it and reply with the recomputed file catalog.
    pub(crate) async fn absorb_table(&self, from: NodeId, incoming: NodeChunkTable) -> Message {
        if !self.view.is_learner().await {
            warn!(from = %from, "placement records arrived at a non-learner");
            return Message::Refused {
                reason: "not the learner".to_string(),
            };
        }

        let (files, records) = {
            let mut table = self.table.write().await;
            table.merge(incoming);
            (table.file_names(), table.record_count())
        };
        self.persist_table().await;
        info!(from = %from, records, files = files.len(), "merged placement records");

        // The catalog is recomputed from the table, not extended, so it
        // always mirrors what the merged records actually mention.
        *self.catalog.write().await = files.iter().cloned().collect::<BTreeSet<String>>();
        self.view.notify(NodeEvent::CatalogUpdated {
            files: files.clone(),
        });
        Message::ChunkMetadataReply { files }
    }
}
