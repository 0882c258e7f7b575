//! Enumerated configuration for both binaries (spec.md §6), loaded via
//! `clap` CLI flags overlaid on `envy`-style environment variables, the way
//! `ethrex-config` layers its own CLI/env/genesis loading.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment overlay: {0}")]
    EnvOverlay(#[from] envy::Error),
}

/// `ubt-daemon`: Consumer + Applier + Query RPC.
#[derive(Debug, Clone, Parser, Deserialize)]
#[command(name = "ubt-daemon", about = "Runs the UBT consumer, applier and query RPC")]
pub struct DaemonConfig {
    #[arg(long, env = "UBT_OUTBOX_RPC_ENDPOINT")]
    pub outbox_rpc_endpoint: String,

    #[arg(long, env = "UBT_OUTBOX_READ_AHEAD", default_value_t = 256)]
    pub outbox_read_ahead: u32,

    #[arg(long, env = "UBT_DATADIR", default_value = "./ubt-data")]
    pub datadir: PathBuf,

    #[arg(long, env = "UBT_APPLY_COMMIT_INTERVAL", default_value_t = 1024)]
    pub apply_commit_interval: u64,

    #[arg(long, env = "UBT_APPLY_COMMIT_MAX_LATENCY_MS", default_value_t = 10_000)]
    pub apply_commit_max_latency_ms: u64,

    #[arg(long, env = "UBT_PENDING_STATE_PERSIST_INTERVAL_MS", default_value_t = 2_000)]
    pub pending_state_persist_interval_ms: u64,

    #[arg(long, env = "UBT_BACKPRESSURE_LAG_THRESHOLD", default_value_t = 5_000)]
    pub backpressure_lag_threshold: u64,

    #[arg(long, env = "UBT_BLOCK_ROOT_INDEX_STRIDE_HIGH_LAG", default_value_t = 64)]
    pub block_root_index_stride_high_lag: u64,

    #[arg(long, env = "UBT_QUERY_RPC_ENABLED", default_value_t = true)]
    pub query_rpc_enabled: bool,

    #[arg(long, env = "UBT_QUERY_RPC_LISTEN_ADDR", default_value = "127.0.0.1:8645")]
    pub query_rpc_listen_addr: String,

    #[arg(long, env = "UBT_TRIEDB_SCHEME", default_value = "path")]
    pub triedb_scheme: String,

    #[arg(long, env = "UBT_TRIEDB_STATE_HISTORY", default_value_t = 90_000)]
    pub triedb_state_history: u64,

    #[arg(long, env = "UBT_MAX_RECOVERABLE_REORG_DEPTH", default_value_t = 128)]
    pub max_recoverable_reorg_depth: u64,

    #[arg(long, env = "UBT_VALIDATION_STRICT_MODE", default_value_t = false)]
    pub validation_strict_mode: bool,

    #[arg(long, env = "UBT_VALIDATION_HALT_ON_MISMATCH", default_value_t = false)]
    pub validation_halt_on_mismatch: bool,

    #[arg(long, env = "UBT_SLOT_INDEX_ENABLED", default_value_t = false)]
    pub slot_index_enabled: bool,

    #[arg(long, env = "UBT_EXECUTION_CLASS_RPC_ENABLED", default_value_t = false)]
    pub execution_class_rpc_enabled: bool,
}

impl DaemonConfig {
    /// Parses CLI flags, then lets any still-unset field fall back to a
    /// bare (unprefixed) environment overlay — used for deployments that
    /// set plain env vars instead of `UBT_`-prefixed ones.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = DaemonConfig::parse();
        if cfg.outbox_rpc_endpoint.is_empty() {
            let overlay: DaemonEnvOverlay = envy::from_env()?;
            if let Some(endpoint) = overlay.outbox_rpc_endpoint {
                cfg.outbox_rpc_endpoint = endpoint;
            }
        }
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize, Default)]
struct DaemonEnvOverlay {
    outbox_rpc_endpoint: Option<String>,
}

/// `ubt-node-plugin`: Emitter + node-side outbox RPC surface.
#[derive(Debug, Clone, Parser, Deserialize)]
#[command(name = "ubt-node-plugin", about = "Runs the UBT emitter and node-side outbox RPC")]
pub struct NodePluginConfig {
    #[arg(long, env = "UBT_OUTBOX_DB_PATH", default_value = "./ubt-outbox")]
    pub outbox_db_path: PathBuf,

    #[arg(long, env = "UBT_OUTBOX_RETENTION_SEQ_WINDOW", default_value_t = 500_000)]
    pub outbox_retention_seq_window: u64,

    #[arg(long, env = "UBT_REORG_MARKER_ENABLED", default_value_t = true)]
    pub reorg_marker_enabled: bool,

    #[arg(long, env = "UBT_OUTBOX_READ_RPC_ENABLED", default_value_t = true)]
    pub outbox_read_rpc_enabled: bool,

    #[arg(long, env = "UBT_OUTBOX_RPC_LISTEN_ADDR", default_value = "127.0.0.1:8646")]
    pub outbox_rpc_listen_addr: String,

    #[arg(long, env = "UBT_DEBUG_RPC_PROXY_ENABLED", default_value_t = false)]
    pub debug_rpc_proxy_enabled: bool,

    #[arg(long, env = "UBT_DEBUG_ENDPOINT", default_value = "127.0.0.1:8646")]
    pub debug_endpoint: String,

    #[arg(long, env = "UBT_DEBUG_TIMEOUT_MS", default_value_t = 5_000)]
    pub debug_timeout_ms: u64,
}

impl NodePluginConfig {
    pub fn load() -> Self {
        NodePluginConfig::parse()
    }
}

/// Process exit codes (spec.md §6): 0 is normal; non-zero distinguishes the
/// reason a fatal error forced a restart-worthy exit.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    ApplyFailure = 1,
    CheckpointCorruption = 2,
    ConfigError = 3,
    OutboxUnavailable = 4,
}

impl ExitCode {
    pub fn exit(self) -> ! {
        std::process::exit(self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_config_parses_minimal_args() {
        let cfg = DaemonConfig::parse_from([
            "ubt-daemon",
            "--outbox-rpc-endpoint",
            "http://127.0.0.1:9000",
        ]);
        assert_eq!(cfg.outbox_rpc_endpoint, "http://127.0.0.1:9000");
        assert_eq!(cfg.outbox_read_ahead, 256);
        assert_eq!(cfg.triedb_scheme, "path");
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(ExitCode::Ok as i32, ExitCode::ApplyFailure as i32);
        assert_ne!(ExitCode::ApplyFailure as i32, ExitCode::CheckpointCorruption as i32);
    }
}
