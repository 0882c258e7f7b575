//! Node-side outbox RPC surface (spec.md §6, §4.I): `ubt_latestSeq`,
//! `ubt_getEvent`, `ubt_getEvents`, `ubt_compactOutboxBelow`, `ubt_status`,
//! plus the `OutboxRpcClient` the consumer uses to reach them.

pub mod client;
pub mod context;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use client::{OutboxClientError, OutboxRpcClient};
pub use context::RpcApiContext;
pub use error::RpcErr;
pub use server::start_api;
