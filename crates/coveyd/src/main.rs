//! `coveyd` — the Covey cluster daemon.
//!
//! Binary entrypoint that wires the cluster view, transport, chunk store
//! and node engine into a running cluster member, plus a small control
//! CLI for talking to live nodes.
//!
//! # Usage
//!
//! ```text
//! coveyd start -i 0                  # start node 0 of the configured cluster
//! coveyd start -i 1 -c covey.toml    # start with a config file
//! coveyd start -i 2 --memory        # no disk persistence
//! coveyd status -n 0                 # one node's view of the cluster
//! coveyd upload report.pdf -n 2      # store a file via node 2
//! coveyd retrieve report.pdf -n 2    # start a retrieval check
//! coveyd down -n 1                   # administratively down a node
//! coveyd up -n 1                     # bring it back
//! ```

mod config;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use covey_cluster::{ClusterView, layout, monitor};
use covey_engine::Node;
use covey_meta::DocStore;
use covey_net::{Message, MessageHandler, TcpTransport, Transport};
use covey_store::{ChunkStore, FileStore, MemoryStore};
use covey_types::NodeId;

use config::CliConfig;

/// Timeout for a single control or cluster RPC.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "coveyd", version, about = "Covey distributed file cluster daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one node of the configured cluster.
    Start {
        /// Index of this node in the cluster address list.
        #[arg(short, long, env = "COVEY_NODE")]
        index: Option<u16>,

        /// Override data directory (useful for running multiple instances).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Override the bind address, e.g. "0.0.0.0:10002". Peers still
        /// dial this node's entry in the cluster list.
        #[arg(short, long)]
        listen: Option<String>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },

    /// Show a running node's view of the cluster.
    Status {
        /// Node to query.
        #[arg(short, long, default_value = "0")]
        node: u16,
    },

    /// Store a file in the cluster via the given node.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Node that drives the placement.
        #[arg(short, long, default_value = "0")]
        node: u16,
    },

    /// Start a retrieval check for a stored file.
    Retrieve {
        /// Name the file was stored under.
        name: String,

        /// Node that drives the retrieval.
        #[arg(short, long, default_value = "0")]
        node: u16,
    },

    /// Administratively mark a node down.
    Down {
        /// Node to mark down.
        #[arg(short, long, default_value = "0")]
        node: u16,
    },

    /// Bring an administratively downed node back.
    Up {
        /// Node to bring back.
        #[arg(short, long, default_value = "0")]
        node: u16,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            index,
            data_dir,
            listen,
            memory,
        } => {
            // CLI args override config file values.
            if let Some(index) = index {
                config.node.index = Some(index);
            }
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            if let Some(listen) = listen {
                config.node.listen = Some(listen);
            }
            if memory {
                config.storage.backend = "memory".to_string();
            }
            cmd_start(config).await
        }
        Commands::Status { node } => cmd_status(&config, node).await,
        Commands::Upload { file, node } => cmd_upload(&config, &file, node).await,
        Commands::Retrieve { name, node } => cmd_retrieve(&config, &name, node).await,
        Commands::Down { node } => cmd_set_live(&config, node, false).await,
        Commands::Up { node } => cmd_set_live(&config, node, true).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// coveyd start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    let index = config
        .node
        .index
        .context("node index required: pass --index or set [node] index")?;
    let addresses = config.cluster_nodes();
    let layout = layout::derive_ids(&addresses).context("invalid cluster address list")?;
    let (self_id, self_addr) = layout
        .iter()
        .find(|(id, _)| id.as_u16() == index)
        .cloned()
        .with_context(|| {
            format!(
                "node index {index} is outside the configured cluster of {} nodes",
                addresses.len()
            )
        })?;
    let peers: BTreeMap<NodeId, String> =
        layout.into_iter().filter(|(id, _)| *id != self_id).collect();

    info!(
        node = %self_id,
        addr = %self_addr,
        cluster = addresses.len(),
        backend = %config.storage.backend,
        "starting coveyd"
    );

    let memory_mode = config.storage.backend == "memory";
    let data_dir = config.node.data_dir.join(format!("node-{index}"));

    let (store, docs): (Arc<dyn ChunkStore>, Arc<DocStore>) = if memory_mode {
        info!("using in-memory storage, nothing will be persisted");
        let docs = DocStore::open_temporary().context("failed to open doc store")?;
        (Arc::new(MemoryStore::new()), Arc::new(docs))
    } else {
        std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;
        info!(path = %data_dir.display(), "using file storage");
        let store = FileStore::open(&data_dir)
            .await
            .context("failed to open chunk store")?;
        let docs = DocStore::open(data_dir.join("docs")).context("failed to open doc store")?;
        (Arc::new(store), Arc::new(docs))
    };

    let view = ClusterView::new(self_id, self_addr.clone(), peers);
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(REQUEST_TIMEOUT));
    let node_config = config.node_config();
    let election = node_config.election.clone();

    let node = Arc::new(
        Node::new(view, transport.clone(), store, docs, node_config)
            .await
            .context("failed to initialize node")?,
    );

    // Bind before starting the monitor so a misconfigured address fails
    // fast instead of after the boot delay.
    let bind_addr = config.node.listen.clone().unwrap_or_else(|| self_addr.clone());
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening for cluster traffic");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handler: Arc<dyn MessageHandler> = node.clone();
    let server = tokio::spawn(covey_net::serve(listener, handler, shutdown_rx));

    let monitor = monitor::start(
        node.view().clone(),
        node.coordinator().clone(),
        transport,
        election,
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    monitor.shutdown();
    let _ = shutdown_tx.send(true);
    server.await.ok();

    Ok(())
}

// -----------------------------------------------------------------------
// Control commands
// -----------------------------------------------------------------------

/// Send one request to a configured node and return its reply.
async fn request_node(config: &CliConfig, node: u16, msg: Message) -> Result<Message> {
    let addresses = config.cluster_nodes();
    let layout = layout::derive_ids(&addresses).context("invalid cluster address list")?;
    let (_, addr) = layout
        .into_iter()
        .find(|(id, _)| id.as_u16() == node)
        .with_context(|| {
            format!(
                "node {node} is outside the configured cluster of {} nodes",
                addresses.len()
            )
        })?;

    let transport = TcpTransport::new(REQUEST_TIMEOUT);
    transport
        .request(&addr, msg)
        .await
        .with_context(|| format!("node {node} at {addr} is not reachable. Is it running?"))
}

async fn cmd_status(config: &CliConfig, node: u16) -> Result<()> {
    match request_node(config, node, Message::StatusQuery).await? {
        Message::StatusReply { report } => {
            println!("Node {} ({})", report.node_id, report.role);
            println!("  live:    {}", if report.live { "yes" } else { "down" });
            println!("  leader:  node {}", report.leader);
            match report.learner {
                Some(learner) => println!("  learner: node {learner}"),
                None => println!("  learner: none"),
            }
            println!("  epoch:   {}", report.epoch);
            if report.files.is_empty() {
                println!("  files:   none");
            } else {
                println!("  files:   {}", report.files.join(", "));
            }
            Ok(())
        }
        other => bail!("unexpected reply: {other:?}"),
    }
}

async fn cmd_upload(config: &CliConfig, file: &std::path::Path, node: u16) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?
        .to_string();

    let size = data.len();
    match request_node(config, node, Message::Upload { file_name: file_name.clone(), data }).await? {
        Message::Ack => {
            println!("Stored {file_name} ({size} bytes).");
            Ok(())
        }
        Message::Refused { reason } => bail!("upload refused: {reason}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

async fn cmd_retrieve(config: &CliConfig, name: &str, node: u16) -> Result<()> {
    let msg = Message::Retrieve {
        file_name: name.to_string(),
    };
    match request_node(config, node, msg).await? {
        Message::Ack => {
            println!("Retrieval check started for {name}.");
            println!("Holders are re-hashing their chunks; the leader publishes verified locations once the round settles.");
            Ok(())
        }
        Message::Refused { reason } => bail!("retrieval refused: {reason}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

async fn cmd_set_live(config: &CliConfig, node: u16, up: bool) -> Result<()> {
    match request_node(config, node, Message::SetLive { up }).await? {
        Message::Ack => {
            println!(
                "Node {node} marked {}.",
                if up { "up" } else { "down" }
            );
            Ok(())
        }
        Message::Refused { reason } => bail!("refused: {reason}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
