//! [`DocStore`] implementation wrapping a Fjall keyspace.

use std::path::Path;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tracing::debug;

use covey_types::{NodeChunkTable, NodeId};

use crate::MetaError;

type Result<T> = std::result::Result<T, MetaError>;

/// Doc-store backed by Fjall.
///
/// One keyspace maps doc names to postcard-serialized [`NodeChunkTable`]s.
/// Each node owns exactly one doc at a time, named after its role, but old
/// docs are kept so a node that regains a role finds its previous state.
pub struct DocStore {
    /// The underlying Fjall database handle.
    #[allow(dead_code)]
    db: Database,
    /// Doc name → serialized chunk table.
    docs: Keyspace,
}

impl DocStore {
    /// Open a persistent doc-store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db)
    }

    /// Open a temporary doc-store that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_keyspaces(db)
    }

    fn init_keyspaces(db: Database) -> Result<Self> {
        let docs = db.keyspace("docs", KeyspaceCreateOptions::default)?;
        Ok(Self { db, docs })
    }

    /// Read the chunk table stored under a doc name.
    ///
    /// A missing doc reads as an empty table, so a fresh node starts from
    /// nothing without a special case.
    pub fn read_table(&self, doc: &str) -> Result<NodeChunkTable> {
        match self.docs.get(doc.as_bytes())? {
            Some(bytes) => Ok(postcard::from_bytes(&bytes)?),
            None => Ok(NodeChunkTable::new()),
        }
    }

    /// Persist a chunk table under a doc name, replacing the previous doc.
    pub fn write_table(&self, doc: &str, table: &NodeChunkTable) -> Result<()> {
        let value = postcard::to_allocvec(table)?;
        self.docs.insert(doc.as_bytes(), value.as_slice())?;
        debug!(doc, records = table.record_count(), "stored chunk table");
        Ok(())
    }

    /// Delete a doc. Deleting a missing doc is not an error.
    pub fn delete_doc(&self, doc: &str) -> Result<()> {
        self.docs.remove(doc.as_bytes())?;
        debug!(doc, "deleted doc");
        Ok(())
    }

    /// List all doc names present in the store.
    pub fn list_docs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for guard in self.docs.iter() {
            let k = guard.key()?;
            names.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(names)
    }
}

/// Doc name a node persists its table under, derived from its role.
pub fn doc_name(node_id: NodeId, is_learner: bool) -> String {
    if is_learner {
        "learner-doc".to_string()
    } else {
        format!("node-{node_id}-doc")
    }
}
