//! TOML configuration for the Covey daemon.
//!
//! Every section is optional: an empty config file (or none at all) runs a
//! node of the default seven-node localhost cluster.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use covey_cluster::ElectionConfig;
use covey_engine::NodeConfig;

/// Base port of the default localhost cluster.
const DEFAULT_BASE_PORT: u16 = 10_000;

/// Size of the default cluster, leader and learner included.
const DEFAULT_CLUSTER_SIZE: u16 = 7;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// This node's identity and data directory.
    pub node: NodeSection,
    /// Cluster membership.
    pub cluster: ClusterSection,
    /// Election and retrieval timing.
    pub election: ElectionSection,
    /// Chunk storage backend.
    pub storage: StorageSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Index of this node in the cluster address list.
    pub index: Option<u16>,
    /// Directory for persistent data (chunk files, doc store).
    pub data_dir: PathBuf,
    /// Bind address override. Peers still dial this node's entry in the
    /// cluster list.
    pub listen: Option<String>,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".covey"))
            .unwrap_or_else(|| PathBuf::from(".covey"));
        Self {
            index: None,
            data_dir,
            listen: None,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Every node's dial address, in id order. All nodes must be
    /// configured with the same list.
    pub nodes: Vec<String>,
}

/// `[election]` section.
///
/// Durations are milliseconds. Unset values fall back to the production
/// defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ElectionSection {
    /// How long a challenger waits for a higher node before declaring
    /// itself leader.
    pub challenge_window_ms: Option<u64>,
    /// Interval between leader liveness probes.
    pub probe_interval_ms: Option<u64>,
    /// Grace period after boot before the first probe.
    pub boot_delay_ms: Option<u64>,
    /// How long the learner collects holder reports before flushing a
    /// retrieval round.
    pub settle_window_ms: Option<u64>,
    /// Whether an administratively downed node may still start and win
    /// elections.
    pub participate_while_down: Option<bool>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective cluster address list.
    ///
    /// An empty `[cluster] nodes` means the default localhost cluster:
    /// seven nodes on consecutive ports starting at 10000.
    pub fn cluster_nodes(&self) -> Vec<String> {
        if !self.cluster.nodes.is_empty() {
            return self.cluster.nodes.clone();
        }
        (0..DEFAULT_CLUSTER_SIZE)
            .map(|i| format!("127.0.0.1:{}", DEFAULT_BASE_PORT + i))
            .collect()
    }

    /// Effective engine configuration: production defaults with any
    /// `[election]` overrides applied.
    pub fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::default_config();
        let section = &self.election;
        apply_ms(&mut config.election.challenge_window, section.challenge_window_ms);
        apply_ms(&mut config.election.probe_interval, section.probe_interval_ms);
        apply_ms(&mut config.election.boot_delay, section.boot_delay_ms);
        apply_ms(&mut config.settle_window, section.settle_window_ms);
        if let Some(participate) = section.participate_while_down {
            config.election.participate_while_down = participate;
        }
        config
    }

    /// Effective election configuration alone.
    pub fn election_config(&self) -> ElectionConfig {
        self.node_config().election
    }
}

fn apply_ms(target: &mut Duration, value: Option<u64>) {
    if let Some(ms) = value {
        *target = Duration::from_millis(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[node]
index = 2
data_dir = "/tmp/covey-test"
listen = "0.0.0.0:4700"

[cluster]
nodes = ["10.0.0.1:4700", "10.0.0.2:4700", "10.0.0.3:4700"]

[election]
challenge_window_ms = 2000
probe_interval_ms = 6000
boot_delay_ms = 1000
settle_window_ms = 3000
participate_while_down = true

[storage]
backend = "memory"

[log]
level = "debug"
"#;

        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.node.index, Some(2));
        assert_eq!(config.node.data_dir, PathBuf::from("/tmp/covey-test"));
        assert_eq!(config.node.listen.as_deref(), Some("0.0.0.0:4700"));
        assert_eq!(config.cluster_nodes().len(), 3);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.log.level, "debug");

        let node_config = config.node_config();
        assert_eq!(node_config.election.challenge_window, Duration::from_secs(2));
        assert_eq!(node_config.election.probe_interval, Duration::from_secs(6));
        assert_eq!(node_config.election.boot_delay, Duration::from_secs(1));
        assert_eq!(node_config.settle_window, Duration::from_secs(3));
        assert!(node_config.election.participate_while_down);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = CliConfig::from_toml("").unwrap();
        let expected_dir = dirs::home_dir()
            .map(|h| h.join(".covey"))
            .unwrap_or_else(|| PathBuf::from(".covey"));
        assert_eq!(config.node.index, None);
        assert_eq!(config.node.data_dir, expected_dir);
        assert_eq!(config.node.listen, None);
        assert_eq!(config.storage.backend, "file");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_default_cluster_spans_seven_ports() {
        let config = CliConfig::default();
        let nodes = config.cluster_nodes();
        assert_eq!(nodes.len(), 7);
        assert_eq!(nodes[0], "127.0.0.1:10000");
        assert_eq!(nodes[6], "127.0.0.1:10006");
    }

    #[test]
    fn test_unset_election_keeps_production_defaults() {
        let toml = r#"
[election]
settle_window_ms = 250
"#;
        let config = CliConfig::from_toml(toml).unwrap();
        let node_config = config.node_config();
        let defaults = NodeConfig::default_config();
        assert_eq!(node_config.settle_window, Duration::from_millis(250));
        assert_eq!(
            node_config.election.challenge_window,
            defaults.election.challenge_window
        );
        assert_eq!(
            node_config.election.participate_while_down,
            defaults.election.participate_while_down
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covey.toml");
        std::fs::write(
            &path,
            r#"
[node]
index = 1
data_dir = "/tmp/covey-node-1"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.node.index, Some(1));
        assert_eq!(config.node.data_dir, PathBuf::from("/tmp/covey-node-1"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.cluster_nodes().len(), 7);
    }
}
