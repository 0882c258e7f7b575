//! `ubt-daemon`: Consumer + Applier + query RPC (spec.md §6). Mirrors the
//! teacher's `cmd/ethrex` shape — parse config, init tracing, wire up the
//! long-running pieces, run until something fatal happens.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ubt_applier::{Applier, ApplierConfig, CommitCadence};
use ubt_common::Envelope;
use ubt_config::{ConfigError, DaemonConfig, ExitCode};
use ubt_consumer::{
    BootstrapMode, Consumer, ConsumerConfig, ConsumerError, FileCheckpointStore, NoopValidator,
    OutboxSource,
};
use ubt_node_rpc::OutboxRpcClient;
use ubt_rpc::{start_api, RpcApiContext};
use ubt_trie::{MdbxTrieDB, TrieDB};

/// Bridges the consumer's synchronous `OutboxSource` calls to the async
/// `OutboxRpcClient`, for the deployment where the consumer reaches a
/// remote `ubt-node-plugin` instead of an embedded outbox.
struct RemoteOutboxSource {
    client: OutboxRpcClient,
    handle: tokio::runtime::Handle,
}

impl OutboxSource for RemoteOutboxSource {
    fn latest_seq(&self) -> u64 {
        self.handle.block_on(self.client.latest_seq()).unwrap_or(0)
    }

    fn read(&self, seq: u64) -> Result<Option<Envelope>, ConsumerError> {
        self.handle
            .block_on(self.client.get_event(seq))
            .map_err(|e| ConsumerError::Outbox(ubt_outbox::OutboxError::Backend(e.to_string())))
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config() -> DaemonConfig {
    match DaemonConfig::load() {
        Ok(cfg) => cfg,
        Err(ConfigError::EnvOverlay(e)) => {
            tracing::error!(error = %e, "failed to load daemon config");
            ExitCode::ConfigError.exit();
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cfg = load_config();
    run(cfg).await;
}

async fn run(cfg: DaemonConfig) {
    if let Err(e) = std::fs::create_dir_all(&cfg.datadir) {
        tracing::error!(error = %e, datadir = %cfg.datadir.display(), "failed to create datadir");
        ExitCode::ConfigError.exit();
    }

    let trie_path = cfg.datadir.join("trie");
    let db: Arc<dyn TrieDB> = match MdbxTrieDB::open(&trie_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(error = %e, path = %trie_path.display(), "failed to open trie db");
            ExitCode::ConfigError.exit();
        }
    };

    let applier_cfg = ApplierConfig {
        cadence: CommitCadence {
            interval: cfg.apply_commit_interval,
            max_latency_ms: cfg.apply_commit_max_latency_ms,
        },
        ..ApplierConfig::default()
    };
    let applier = Arc::new(RwLock::new(Applier::new(db, None, applier_cfg)));

    let outbox_client = OutboxRpcClient::new(&cfg.outbox_rpc_endpoint);
    let outbox: Arc<dyn OutboxSource> = Arc::new(RemoteOutboxSource {
        client: outbox_client,
        handle: tokio::runtime::Handle::current(),
    });

    let checkpoint = FileCheckpointStore::new(cfg.datadir.join("checkpoint.json"));
    let consumer_cfg = ConsumerConfig {
        max_recoverable_reorg_depth: cfg.max_recoverable_reorg_depth,
        backpressure_lag_threshold: cfg.backpressure_lag_threshold,
        validation_strict_mode: cfg.validation_strict_mode,
        validation_halt_on_mismatch: cfg.validation_halt_on_mismatch,
    };

    let mut consumer = match Consumer::new(
        consumer_cfg,
        Arc::clone(&applier),
        outbox,
        checkpoint,
        NoopValidator,
    ) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to construct consumer");
            ExitCode::CheckpointCorruption.exit();
        }
    };

    if let Err(e) = consumer.recover(BootstrapMode::Backfill) {
        tracing::error!(error = %e, "startup recovery failed");
        ExitCode::CheckpointCorruption.exit();
    }

    if cfg.query_rpc_enabled {
        let listen_addr: SocketAddr = match cfg.query_rpc_listen_addr.parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, addr = %cfg.query_rpc_listen_addr, "invalid query rpc listen addr");
                ExitCode::ConfigError.exit();
            }
        };
        let rpc_context = RpcApiContext {
            applier: Arc::clone(&applier),
        };
        tokio::spawn(async move {
            if let Err(e) = start_api(listen_addr, rpc_context).await {
                tracing::error!(error = %e, "query rpc server exited");
            }
        });
    }

    let consume_result = tokio::task::spawn_blocking(move || run_consume_loop(consumer)).await;

    match consume_result {
        Ok(Ok(())) => ExitCode::Ok.exit(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "consumer loop exited with an apply failure");
            ExitCode::ApplyFailure.exit();
        }
        Err(e) => {
            tracing::error!(error = %e, "consumer task panicked");
            ExitCode::ApplyFailure.exit();
        }
    }
}

/// Drives `consume_next` until it's fatal (spec.md §4.G state machine never
/// returns control on its own; this loop is the process's main work).
fn run_consume_loop<C: ubt_consumer::CheckpointStore, V: ubt_consumer::UpstreamValidator>(
    mut consumer: Consumer<C, V>,
) -> Result<(), ConsumerError> {
    loop {
        match consumer.consume_next() {
            Ok(true) => continue,
            Ok(false) => std::thread::sleep(std::time::Duration::from_millis(200)),
            Err(e) => {
                tracing::error!(error = %e, "apply failed");
                return Err(e);
            }
        }
    }
}
