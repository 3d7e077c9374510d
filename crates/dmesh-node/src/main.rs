//! dmesh-node — the Intelligent Delegation Mesh node binary.
//!
//! Startup sequence:
//!   1. Load or generate this node's signing key
//!   2. Load any contracts persisted from a previous run
//!   3. Fund the local escrow account (dev convenience)
//!   4. Start background loops: membership sweep, heartbeats, gossip,
//!      re-delegation health checks, friction digest
//!   5. Start the HTTP transport
//!   6. Join configured bootstrap peers
//!   7. Run until interrupted, then persist and shut down

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::RngCore;
use tracing::{info, warn};

use dmesh_core::types::NodeIdentity;
use dmesh_crypto::KeyPair;
use dmesh_node::config::MeshConfig;
use dmesh_node::manager::MeshManager;
use dmesh_transport::handler::MeshHandler;
use dmesh_transport::{build_router, serve, MeshClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dmesh=debug".parse().unwrap()),
        )
        .init();

    let cfg = MeshConfig::parse();
    info!("mesh node starting");

    let data_dir = expand_tilde(&cfg.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let keypair = load_or_generate_keypair(&cfg.key_seed_path())
        .context("loading or generating node signing key")?;
    info!(node_id = %keypair.node_id, "node identity ready");

    let identity = NodeIdentity {
        id: keypair.node_id,
        name: cfg.node_name.clone(),
        base_url: cfg.base_url.clone(),
        capabilities: cfg.capabilities.iter().cloned().collect::<BTreeSet<_>>(),
        public_key: Some(keypair.public_key.clone()),
        credentials: Vec::new(),
        version: 1,
    };

    let manager = Arc::new(MeshManager::new(&cfg, identity, keypair, cfg.contracts_path()));

    manager
        .load_persisted_contracts()
        .await
        .context("loading persisted contracts")?;
    manager.fund_self(cfg.initial_escrow_balance).await;

    let background = Arc::clone(&manager).start().await;

    let handler: Arc<dyn MeshHandler> = manager.clone();
    let router = build_router(handler, cfg.shared_secret.clone());
    let bind_addr = cfg.bind_addr;
    tokio::spawn(async move {
        if let Err(e) = serve(router, bind_addr).await {
            warn!(error = %e, "transport server exited");
        }
    });
    info!(addr = %bind_addr, "transport listening");

    for peer_url in &cfg.bootstrap_peers {
        let client = MeshClient::new(peer_url.clone(), cfg.shared_secret.clone())
            .with_deadline_ms(cfg.request_deadline_ms);
        match client.join(manager.get_identity()).await {
            Ok(()) => info!(peer = %peer_url, "joined bootstrap peer"),
            Err(e) => warn!(peer = %peer_url, error = %e, "failed to join bootstrap peer"),
        }
    }

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");

    for handle in background {
        handle.abort();
    }
    manager.persist_contracts().await.context("persisting contracts on shutdown")?;

    Ok(())
}

/// Load the node's signing key seed from `path`, generating and persisting
/// a fresh one on first run. The seed is 32 raw bytes — no encoding, no
/// passphrase — matching the dev-convenience posture of `initial_escrow_balance`.
fn load_or_generate_keypair(path: &Path) -> anyhow::Result<KeyPair> {
    if let Ok(bytes) = std::fs::read(path) {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("key seed at {} is not 32 bytes", path.display()))?;
        return Ok(KeyPair::from_seed(seed));
    }
    warn!(path = %path.display(), "no signing key found, generating one");
    // KeyPair::generate() doesn't expose its seed bytes, so the seed is
    // drawn here directly and the keypair derived from it via from_seed,
    // keeping the on-disk seed and the in-memory key reproducibly linked.
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    std::fs::write(path, seed).with_context(|| format!("writing key seed to {}", path.display()))?;
    Ok(KeyPair::from_seed(seed))
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
