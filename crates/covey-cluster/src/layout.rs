//! Static cluster layout: deriving node ids from the address list.
//!
//! A cluster is configured as a flat list of `host:port` addresses. A
//! node's id is its port's rank above the lowest configured port, which
//! must make the ids dense: ports 10000..10000+N give ids 0..N-1. Every
//! node derives the same ids from the same list, so the config stays a
//! single shared address list.

use std::collections::BTreeMap;

use covey_types::NodeId;

use crate::ClusterError;

/// Derive `(id, address)` pairs from a configured address list.
///
/// The result is ordered by id. Unparseable addresses, duplicate ports
/// and ports that leave gaps in the id range are rejected.
pub fn derive_ids(addrs: &[String]) -> Result<Vec<(NodeId, String)>, ClusterError> {
    if addrs.is_empty() {
        return Err(ClusterError::EmptyCluster);
    }

    let mut ports = Vec::with_capacity(addrs.len());
    for addr in addrs {
        ports.push((parse_port(addr)?, addr.clone()));
    }

    let base = ports.iter().map(|(port, _)| *port).min().unwrap_or(0);

    let mut by_id: BTreeMap<u16, String> = BTreeMap::new();
    for (port, addr) in ports {
        let offset = port - base;
        if offset as usize >= addrs.len() {
            return Err(ClusterError::SparsePorts { addr, base });
        }
        if let Some(existing) = by_id.insert(offset, addr.clone()) {
            return Err(ClusterError::DuplicatePort {
                first: existing,
                second: addr,
            });
        }
    }

    Ok(by_id
        .into_iter()
        .map(|(id, addr)| (NodeId::new(id), addr))
        .collect())
}

fn parse_port(addr: &str) -> Result<u16, ClusterError> {
    addr.rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
        .ok_or_else(|| ClusterError::InvalidAddress(addr.to_string()))
}
