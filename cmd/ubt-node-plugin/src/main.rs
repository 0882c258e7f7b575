//! `ubt-node-plugin`: a thin demonstration of the Emitter plus the
//! node-side outbox RPC surface (spec.md §6, §4.I). Opens (or creates) an
//! on-disk outbox, wraps it in an `Emitter`, and serves the RPC surface
//! the consumer's `OutboxRpcClient` reaches.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ubt_config::NodePluginConfig;
use ubt_emitter::Emitter;
use ubt_node_rpc::{start_api, RpcApiContext};
use ubt_outbox::{MdbxOutboxBackend, Outbox};

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cfg = NodePluginConfig::load();

    if let Some(parent) = cfg.outbox_db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(error = %e, path = %parent.display(), "failed to create outbox parent dir");
            std::process::exit(1);
        }
    }

    let backend = match MdbxOutboxBackend::open(&cfg.outbox_db_path) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, path = %cfg.outbox_db_path.display(), "failed to open outbox db");
            std::process::exit(1);
        }
    };
    let outbox = match Outbox::open(Box::new(backend), cfg.outbox_retention_seq_window) {
        Ok(outbox) => Arc::new(outbox),
        Err(e) => {
            tracing::error!(error = %e, "failed to open outbox");
            std::process::exit(1);
        }
    };

    let emitter = Arc::new(Emitter::new(Arc::clone(&outbox)));

    if cfg.debug_rpc_proxy_enabled {
        tracing::warn!("debug rpc proxy was requested but is not implemented in this build");
    }

    if !cfg.outbox_read_rpc_enabled {
        tracing::info!("outbox read rpc disabled, idling");
        std::future::pending::<()>().await;
        return;
    }

    let listen_addr: SocketAddr = match cfg.outbox_rpc_listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, addr = %cfg.outbox_rpc_listen_addr, "invalid outbox rpc listen addr");
            std::process::exit(1);
        }
    };

    let context = RpcApiContext { outbox, emitter };
    if let Err(e) = start_api(listen_addr, context).await {
        tracing::error!(error = %e, "node outbox rpc server exited");
        std::process::exit(1);
    }
}
